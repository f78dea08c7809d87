// src/reputation/mod.rs
//! # Reputation Scoring
//! Continuously-refreshed 0..100 trust score per phone number, computed from
//! community reports, call history, block rates, list membership, timing
//! patterns and carrier data.
//!
//! The hot path never waits for a recompute: a stored score younger than the
//! freshness window is returned as-is (confidence 0.8); anything older is
//! served stale (0.6) or neutral (0.3) while a background recompute is
//! coalesced through the batch queue.

pub mod batch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::ScreeningConfig;
use crate::signals::{CarrierLookup, CarrierRecord};
use crate::stores::{
    CallLogStore, ListEntry, PhoneNumberStore, ReputationFactors, SpamReport, SpamReportStore,
};

use batch::{BatchQueue, BatchQueueCfg, EnqueueOutcome};

/// Direction of the score since the previous recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationTrend {
    Improving,
    Declining,
    Stable,
}

/// Ephemeral view handed to callers; `confidence` reflects how much data
/// backed the score, not how risky the number is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationDetails {
    pub score: f32,
    pub factors: ReputationFactors,
    pub last_update: DateTime<Utc>,
    pub trend: ReputationTrend,
    pub confidence: f32,
}

impl ReputationDetails {
    /// Neutral stance for an unseen number.
    fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            score: 50.0,
            factors: ReputationFactors::neutral(),
            last_update: now,
            trend: ReputationTrend::Stable,
            confidence: 0.3,
        }
    }
}

/// Factor blend weights; fixed, sum to 1.0.
const W_COMMUNITY: f32 = 0.30;
const W_CALL_HISTORY: f32 = 0.15;
const W_BLOCK_RATE: f32 = 0.25;
const W_VERIFICATION: f32 = 0.15;
const W_TIME: f32 = 0.10;
const W_CARRIER: f32 = 0.05;

struct Inner {
    phone_numbers: Arc<dyn PhoneNumberStore>,
    call_logs: Arc<dyn CallLogStore>,
    spam_reports: Arc<dyn SpamReportStore>,
    carrier: Arc<dyn CarrierLookup>,
    queue: BatchQueue,
    fresh_window: chrono::Duration,
    home_country: String,
    trusted_carriers: Vec<String>,
}

/// Cheap-to-clone handle; clones share the queue and collaborators, so the
/// service can hand itself to spawned flush tasks.
#[derive(Clone)]
pub struct ReputationService {
    inner: Arc<Inner>,
}

impl ReputationService {
    pub fn new(
        cfg: &ScreeningConfig,
        phone_numbers: Arc<dyn PhoneNumberStore>,
        call_logs: Arc<dyn CallLogStore>,
        spam_reports: Arc<dyn SpamReportStore>,
        carrier: Arc<dyn CarrierLookup>,
        journal_path: Option<PathBuf>,
    ) -> Self {
        let queue = BatchQueue::new(
            BatchQueueCfg {
                max_pending: cfg.queue_max_pending,
                debounce: Duration::from_secs(cfg.queue_debounce_secs),
            },
            journal_path,
        );
        Self {
            inner: Arc::new(Inner {
                phone_numbers,
                call_logs,
                spam_reports,
                carrier,
                queue,
                fresh_window: chrono::Duration::seconds(cfg.reputation_fresh_secs as i64),
                home_country: cfg.home_country.clone(),
                trusted_carriers: cfg.trusted_carriers.clone(),
            }),
        }
    }

    /// Replay journaled recomputes left over from a previous process and arm
    /// a flush for them. Call once at startup.
    pub fn recover(&self) {
        let replayed = self.inner.queue.replay_journal(Utc::now());
        if !replayed.is_empty() {
            debug!(target: "reputation", count = replayed.len(), "journal replayed");
            self.schedule_flush(Duration::ZERO);
        }
    }

    /// Best-available reputation, never blocking on a recompute.
    pub async fn reputation_for(&self, number: &str) -> ReputationDetails {
        let now = Utc::now();
        let stored = match self.inner.phone_numbers.find_by_number(number).await {
            Ok(rec) => rec,
            Err(err) => {
                warn!(target: "reputation", error = ?err, "record lookup failed");
                None
            }
        };

        if let Some(rec) = stored {
            if let (Some(score), Some(factors), Some(updated)) =
                (rec.reputation_score, rec.score_factors, rec.last_score_update)
            {
                if now.signed_duration_since(updated) < self.inner.fresh_window {
                    counter!("reputation_cache_hits_total").increment(1);
                    return ReputationDetails {
                        score,
                        factors,
                        last_update: updated,
                        trend: ReputationTrend::Stable,
                        confidence: 0.8,
                    };
                }
                // Stale: serve what we have, refresh in the background.
                self.request_refresh(number, now);
                return ReputationDetails {
                    score,
                    factors,
                    last_update: updated,
                    trend: ReputationTrend::Stable,
                    confidence: 0.6,
                };
            }
        }

        self.request_refresh(number, now);
        ReputationDetails::unknown(now)
    }

    /// Queue a background refresh without waiting for it.
    pub fn refresh_soon(&self, number: &str) {
        self.request_refresh(number, Utc::now());
    }

    /// Synchronous full recompute, for admin use.
    pub async fn force_recalculate(&self, number: &str) -> Result<ReputationDetails> {
        self.recompute(number).await
    }

    /// Explicit bulk recompute; runs all numbers concurrently and returns
    /// how many succeeded.
    pub async fn batch_update(&self, numbers: &[String]) -> usize {
        let mut set = JoinSet::new();
        for number in numbers {
            let svc = self.clone();
            let number = number.clone();
            set.spawn(async move { svc.recompute(&number).await });
        }
        let mut ok = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(_)) => ok += 1,
                Ok(Err(err)) => warn!(target: "reputation", error = ?err, "bulk recompute failed"),
                Err(err) => warn!(target: "reputation", error = ?err, "bulk recompute panicked"),
            }
        }
        ok
    }

    pub fn pending_recomputes(&self) -> usize {
        self.inner.queue.len()
    }

    fn request_refresh(&self, number: &str, now: DateTime<Utc>) {
        match self.inner.queue.enqueue(number, now) {
            EnqueueOutcome::SizeTriggered => self.schedule_flush(Duration::ZERO),
            EnqueueOutcome::FirstPending => self.schedule_flush(self.inner.queue.debounce()),
            EnqueueOutcome::Coalesced => {}
        }
    }

    fn schedule_flush(&self, delay: Duration) {
        let svc = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            svc.flush().await;
        });
    }

    async fn flush(&self) {
        let Some(numbers) = self.inner.queue.begin_flush() else {
            return;
        };
        debug!(target: "reputation", count = numbers.len(), "flushing recompute queue");
        let recomputed = self.batch_update(&numbers).await;
        counter!("reputation_flushes_total").increment(1);
        debug!(target: "reputation", recomputed, "flush complete");
        self.inner.queue.end_flush();
    }

    /// Full recompute of one number: gathers its history concurrently,
    /// derives the six factors, blends, persists, returns the detail view.
    async fn recompute(&self, number: &str) -> Result<ReputationDetails> {
        let inner = &self.inner;
        let now = Utc::now();
        let month_ago = now - chrono::Duration::days(30);
        let week_ago = now - chrono::Duration::days(7);

        let (reports, stats30, stats7, last_entry, carrier, prior) = tokio::join!(
            inner.spam_reports.reports_for(number),
            inner.call_logs.stats_since(number, month_ago),
            inner.call_logs.stats_since(number, week_ago),
            inner.call_logs.last_entry(number),
            inner.carrier.lookup(number),
            inner.phone_numbers.find_by_number(number),
        );

        let reports = reports?;
        let stats30 = stats30?;
        let stats7 = stats7?;
        let last_entry = last_entry?;
        let prior = prior?;
        let carrier = match carrier {
            Ok(c) => c,
            Err(err) => {
                // Carrier data only moves the smallest factor; a lookup
                // failure degrades to neutral instead of failing the recompute.
                warn!(target: "reputation", error = ?err, "carrier lookup failed during recompute");
                None
            }
        };

        let entry = prior.as_ref().and_then(|r| r.entry);
        let factors = ReputationFactors {
            community_reports: community_reports_factor(&reports, now),
            call_history: call_history_factor(stats30.total_calls, stats7.total_calls),
            block_rate: block_rate_factor(stats30.block_rate(), stats7.block_rate()),
            verification_status: verification_factor(entry),
            time_factors: time_factor(stats7.total_calls),
            carrier_trust: self.carrier_trust_factor(carrier.as_ref()),
        };

        let score = (factors.community_reports * W_COMMUNITY
            + factors.call_history * W_CALL_HISTORY
            + factors.block_rate * W_BLOCK_RATE
            + factors.verification_status * W_VERIFICATION
            + factors.time_factors * W_TIME
            + factors.carrier_trust * W_CARRIER)
            .round()
            .clamp(0.0, 100.0);

        let previous_score = prior.as_ref().and_then(|r| r.reputation_score);
        let trend = match previous_score {
            Some(prev) if score - prev >= 5.0 => ReputationTrend::Improving,
            Some(prev) if score - prev <= -5.0 => ReputationTrend::Declining,
            _ => ReputationTrend::Stable,
        };

        let mut points = 0u32;
        if !reports.is_empty() {
            points += 1;
        }
        if stats30.total_calls > 3 {
            points += 1;
        }
        if stats7.total_calls > 0 || last_entry.map_or(false, |e| e.timestamp >= week_ago) {
            points += 1;
        }
        if previous_score.is_some() {
            points += 1;
        }
        let confidence = (points as f32 / 4.0 + 0.2).min(1.0);

        inner
            .phone_numbers
            .upsert_reputation(number, score, factors, now)
            .await?;
        counter!("reputation_recomputes_total").increment(1);

        Ok(ReputationDetails {
            score,
            factors,
            last_update: now,
            trend,
            confidence,
        })
    }

    fn carrier_trust_factor(&self, carrier: Option<&CarrierRecord>) -> f32 {
        let Some(c) = carrier else {
            return 50.0;
        };
        let mut factor: f32 = 50.0;
        if c.is_mobile {
            factor += 10.0;
        }
        let name = c.name.to_ascii_lowercase();
        if self
            .inner
            .trusted_carriers
            .iter()
            .any(|t| name.contains(t.as_str()))
        {
            factor += 10.0;
        }
        if !c.country.eq_ignore_ascii_case(&self.inner.home_country) {
            factor -= 10.0;
        }
        factor.clamp(0.0, 100.0)
    }
}

// ── Factor math ─────────────────────────────────────────────────────────────

/// Age decay applied to report penalties: recent reports hurt the most.
fn report_decay(age: chrono::Duration) -> f32 {
    if age < chrono::Duration::days(1) {
        1.0
    } else if age < chrono::Duration::weeks(1) {
        0.8
    } else if age < chrono::Duration::days(30) {
        0.5
    } else {
        0.2
    }
}

fn community_reports_factor(reports: &[SpamReport], now: DateTime<Utc>) -> f32 {
    let mut factor = 100.0f32;
    for report in reports {
        let base = if report.verified { 15.0 } else { 5.0 };
        let age = now.signed_duration_since(report.reported_at);
        factor -= base * report_decay(age);
    }
    factor.max(0.0)
}

fn call_history_factor(total: u64, recent: u64) -> f32 {
    if total == 0 {
        return 50.0; // unknown caller, neutral
    }
    if total > 10 && recent > 5 {
        70.0
    } else if total > 5 {
        60.0
    } else if total > 2 {
        50.0
    } else {
        40.0
    }
}

fn block_rate_factor(overall: f32, recent: f32) -> f32 {
    (100.0 * (1.0 - (overall * 0.3 + recent * 0.7))).clamp(0.0, 100.0)
}

fn verification_factor(entry: Option<ListEntry>) -> f32 {
    match entry {
        Some(ListEntry::Whitelist) => 100.0,
        Some(ListEntry::Blacklist) => 0.0,
        None => 50.0,
    }
}

fn time_factor(recent_calls: u64) -> f32 {
    let per_day = recent_calls as f32 / 7.0;
    if per_day > 10.0 {
        20.0 // spam-like burst
    } else if (1.0..=3.0).contains(&per_day) {
        80.0 // normal cadence
    } else if recent_calls == 0 {
        40.0 // rare caller
    } else {
        60.0
    }
}
