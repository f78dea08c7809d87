// src/stores/memory.rs
//! In-memory store implementations used by tests and the simulated/dev
//! environment. Mutex-guarded maps; every mutation is a single critical
//! section so the upsert/increment semantics match what a database would
//! provide.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{
    CallLogEntry, CallLogStore, CallWindowStats, ListEntry, PhoneNumberRecord, PhoneNumberStore,
    ReputationFactors, SpamReport, SpamReportStore, VerificationCode, VerificationCodeStore,
};

#[derive(Debug, Default)]
pub struct MemoryPhoneNumberStore {
    records: Mutex<HashMap<String, PhoneNumberRecord>>,
}

impl MemoryPhoneNumberStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/dev helper: seed a full record.
    pub fn seed(&self, record: PhoneNumberRecord) {
        let mut map = self.records.lock().expect("phone store mutex poisoned");
        map.insert(record.number.clone(), record);
    }
}

fn blank_record(number: &str) -> PhoneNumberRecord {
    PhoneNumberRecord {
        number: number.to_string(),
        entry: None,
        reputation_score: None,
        score_factors: None,
        last_score_update: None,
    }
}

#[async_trait::async_trait]
impl PhoneNumberStore for MemoryPhoneNumberStore {
    async fn find_by_number(&self, number: &str) -> Result<Option<PhoneNumberRecord>> {
        let map = self.records.lock().expect("phone store mutex poisoned");
        Ok(map.get(number).cloned())
    }

    async fn upsert_reputation(
        &self,
        number: &str,
        score: f32,
        factors: ReputationFactors,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut map = self.records.lock().expect("phone store mutex poisoned");
        let rec = map
            .entry(number.to_string())
            .or_insert_with(|| blank_record(number));
        rec.reputation_score = Some(score);
        rec.score_factors = Some(factors);
        rec.last_score_update = Some(updated_at);
        Ok(())
    }

    async fn set_entry(&self, number: &str, entry: ListEntry) -> Result<()> {
        let mut map = self.records.lock().expect("phone store mutex poisoned");
        let rec = map
            .entry(number.to_string())
            .or_insert_with(|| blank_record(number));
        rec.entry = Some(entry);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCallLogStore {
    entries: Mutex<Vec<CallLogEntry>>,
}

impl MemoryCallLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("call log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CallLogStore for MemoryCallLogStore {
    async fn append(&self, entry: CallLogEntry) -> Result<()> {
        let mut v = self.entries.lock().expect("call log mutex poisoned");
        v.push(entry);
        Ok(())
    }

    async fn stats_since(&self, number: &str, since: DateTime<Utc>) -> Result<CallWindowStats> {
        let v = self.entries.lock().expect("call log mutex poisoned");
        let mut total = 0u64;
        let mut blocked = 0u64;
        let mut dur_sum = 0.0f32;
        let mut dur_n = 0u64;
        for e in v.iter() {
            if e.phone_number == number && e.timestamp >= since {
                total += 1;
                if e.action == crate::risk::ScreenAction::Blocked {
                    blocked += 1;
                }
                if let Some(d) = e.duration_secs {
                    dur_sum += d;
                    dur_n += 1;
                }
            }
        }
        Ok(CallWindowStats {
            total_calls: total,
            blocked_calls: blocked,
            avg_duration_secs: if dur_n > 0 { dur_sum / dur_n as f32 } else { 0.0 },
        })
    }

    async fn last_entry(&self, number: &str) -> Result<Option<CallLogEntry>> {
        let v = self.entries.lock().expect("call log mutex poisoned");
        Ok(v.iter()
            .rev()
            .find(|e| e.phone_number == number)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemorySpamReportStore {
    reports: Mutex<Vec<SpamReport>>,
}

impl MemorySpamReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SpamReportStore for MemorySpamReportStore {
    async fn reports_for(&self, number: &str) -> Result<Vec<SpamReport>> {
        let v = self.reports.lock().expect("spam report mutex poisoned");
        Ok(v.iter()
            .filter(|r| r.phone_number == number)
            .cloned()
            .collect())
    }

    async fn add_report(&self, report: SpamReport) -> Result<()> {
        let mut v = self.reports.lock().expect("spam report mutex poisoned");
        v.push(report);
        Ok(())
    }

    async fn add_confirmation(&self, number: &str) -> Result<u32> {
        // Single locked update stands in for the storage engine's atomic
        // increment; no read-then-write escapes the critical section.
        let mut v = self.reports.lock().expect("spam report mutex poisoned");
        let newest = v
            .iter_mut()
            .filter(|r| r.phone_number == number)
            .max_by_key(|r| r.reported_at);
        match newest {
            Some(r) => {
                r.confirmations += 1;
                r.status = super::ReportStatus::Confirmed;
                Ok(r.confirmations)
            }
            None => Ok(0),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryVerificationCodeStore {
    codes: Mutex<Vec<VerificationCode>>,
    attempts: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl MemoryVerificationCodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl VerificationCodeStore for MemoryVerificationCodeStore {
    async fn insert(&self, code: VerificationCode) -> Result<()> {
        let mut v = self.codes.lock().expect("verification mutex poisoned");
        v.push(code);
        Ok(())
    }

    async fn consume(&self, number: &str, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut v = self.codes.lock().expect("verification mutex poisoned");
        for c in v.iter_mut().rev() {
            if c.phone_number == number && c.code == code && !c.used && c.expires_at > now {
                c.used = true;
                c.attempts += 1;
                return Ok(true);
            }
        }
        // Count the failed attempt on the newest code for the number, if any.
        if let Some(c) = v.iter_mut().rev().find(|c| c.phone_number == number) {
            c.attempts += 1;
        }
        Ok(false)
    }

    async fn record_attempt(&self, number: &str, at: DateTime<Utc>) -> Result<()> {
        let mut v = self.attempts.lock().expect("verification mutex poisoned");
        v.push((number.to_string(), at));
        Ok(())
    }

    async fn attempts_since(&self, number: &str, since: DateTime<Utc>) -> Result<u32> {
        let v = self.attempts.lock().expect("verification mutex poisoned");
        Ok(v.iter()
            .filter(|(n, at)| n == number && *at >= since)
            .count() as u32)
    }
}
