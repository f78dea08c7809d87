// src/stores/mod.rs
//! Persistence collaborators. The core only depends on these trait shapes;
//! real deployments back them with a database, tests and dev mode use the
//! in-memory implementations in [`memory`].
//!
//! All mutations are single-statement upserts so atomicity can be delegated
//! to the storage engine; the one incremented counter (spam-report
//! confirmations) is an atomic increment at the store, never a
//! read-modify-write in application code.

pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::ScreenAction;

/// Whitelist/blacklist membership of a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListEntry {
    Whitelist,
    Blacklist,
}

/// The six reputation factors, each 0..100. Persisted alongside the score so
/// a fresh cache hit can return the full detail without recomputing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReputationFactors {
    pub community_reports: f32,
    pub call_history: f32,
    pub block_rate: f32,
    pub verification_status: f32,
    pub time_factors: f32,
    pub carrier_trust: f32,
}

impl ReputationFactors {
    /// The neutral stance for a number we know nothing about.
    pub fn neutral() -> Self {
        Self {
            community_reports: 50.0,
            call_history: 50.0,
            block_rate: 50.0,
            verification_status: 50.0,
            time_factors: 50.0,
            carrier_trust: 50.0,
        }
    }
}

/// Persistent per-number record, created on first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumberRecord {
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<ListEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_factors: Option<ReputationFactors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_score_update: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait PhoneNumberStore: Send + Sync {
    async fn find_by_number(&self, number: &str) -> Result<Option<PhoneNumberRecord>>;
    /// Upsert the reputation fields of a record in one statement.
    async fn upsert_reputation(
        &self,
        number: &str,
        score: f32,
        factors: ReputationFactors,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
    /// Upsert the list membership of a record in one statement.
    async fn set_entry(&self, number: &str, entry: ListEntry) -> Result<()>;
}

/// One audited screening outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub phone_number: String,
    pub timestamp: DateTime<Utc>,
    pub action: ScreenAction,
    pub risk: f32,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f32>,
}

/// Aggregates over a time window of one number's log entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CallWindowStats {
    pub total_calls: u64,
    pub blocked_calls: u64,
    pub avg_duration_secs: f32,
}

impl CallWindowStats {
    pub fn block_rate(&self) -> f32 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.blocked_calls as f32 / self.total_calls as f32
        }
    }
}

#[async_trait::async_trait]
pub trait CallLogStore: Send + Sync {
    async fn append(&self, entry: CallLogEntry) -> Result<()>;
    async fn stats_since(&self, number: &str, since: DateTime<Utc>) -> Result<CallWindowStats>;
    async fn last_entry(&self, number: &str) -> Result<Option<CallLogEntry>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Confirmed,
    Dismissed,
}

/// A community spam report against a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamReport {
    pub phone_number: String,
    pub reported_at: DateTime<Utc>,
    pub verified: bool,
    pub confirmations: u32,
    pub status: ReportStatus,
}

#[async_trait::async_trait]
pub trait SpamReportStore: Send + Sync {
    async fn reports_for(&self, number: &str) -> Result<Vec<SpamReport>>;
    async fn add_report(&self, report: SpamReport) -> Result<()>;
    /// Atomic increment of the confirmation counter for the newest report on
    /// this number. Returns the new count (0 when there is nothing to confirm).
    async fn add_confirmation(&self, number: &str) -> Result<u32>;
}

/// Short-lived challenge code; consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub phone_number: String,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub attempts: u32,
}

#[async_trait::async_trait]
pub trait VerificationCodeStore: Send + Sync {
    async fn insert(&self, code: VerificationCode) -> Result<()>;
    /// Atomically consume a matching, unused, unexpired code: marks it used
    /// and returns `true`; otherwise `false`.
    async fn consume(&self, number: &str, code: &str, now: DateTime<Utc>) -> Result<bool>;
    /// Record one verification attempt (success or failure) against a number.
    async fn record_attempt(&self, number: &str, at: DateTime<Utc>) -> Result<()>;
    /// Attempts recorded for this number since `since`.
    async fn attempts_since(&self, number: &str, since: DateTime<Utc>) -> Result<u32>;
}
