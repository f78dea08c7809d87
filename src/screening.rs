//! # Screening Orchestrator
//! Drives one call through validate → aggregate → score → side effects and
//! owns the fail-open policy: after validation, nothing in the pipeline may
//! surface an error to the caller — worst case the call is allowed at low
//! confidence with an explicit `FailOpen` origin. Availability beats a false
//! block.
//!
//! Side effects on a block/challenge decision: a verification code is issued
//! and attached so the caller can be offered a challenge path; every outcome
//! is best-effort persisted to the call log and counted in metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::aggregate::FeatureAggregator;
use crate::config::ScreeningConfig;
use crate::error::ScreenError;
use crate::features::CallFeatures;
use crate::phone;
use crate::reputation::ReputationService;
use crate::risk::{
    calculate_risk_with, DecisionOrigin, RiskBreakdown, RiskThresholds, RiskWeights, ScreenAction,
};
use crate::signals::AudioClip;
use crate::stores::{CallLogEntry, CallLogStore, ListEntry, PhoneNumberStore, SpamReportStore};
use crate::verification::VerificationService;

/// Batch screening runs numbers in fixed-size concurrent chunks.
const BATCH_CHUNK: usize = 10;

/// Challenge-path attachment on a blocked/challenged result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOffer {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreeningMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub development_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    /// Set only on fail-open outcomes; carries the internal error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the core hands back for one screened call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub action: ScreenAction,
    pub reason: String,
    pub risk: f32,
    pub confidence: f32,
    pub breakdown: RiskBreakdown,
    /// Fraction of signal categories that had data for this decision.
    pub coverage: f32,
    pub origin: DecisionOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationOffer>,
    pub metadata: ScreeningMetadata,
}

struct Inner {
    aggregator: FeatureAggregator,
    verification: Arc<VerificationService>,
    call_logs: Arc<dyn CallLogStore>,
    spam_reports: Arc<dyn SpamReportStore>,
    phone_numbers: Arc<dyn PhoneNumberStore>,
    reputation: ReputationService,
    weights: RiskWeights,
    thresholds: RiskThresholds,
    development_mode: bool,
    blacklist_confirmations: u32,
}

/// Cheap-to-clone handle over the orchestrator, so batch screening can fan
/// out over spawned tasks.
#[derive(Clone)]
pub struct ScreeningService {
    inner: Arc<Inner>,
}

impl ScreeningService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &ScreeningConfig,
        aggregator: FeatureAggregator,
        verification: Arc<VerificationService>,
        call_logs: Arc<dyn CallLogStore>,
        spam_reports: Arc<dyn SpamReportStore>,
        phone_numbers: Arc<dyn PhoneNumberStore>,
        reputation: ReputationService,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                aggregator,
                verification,
                call_logs,
                spam_reports,
                phone_numbers,
                reputation,
                weights: cfg.weights,
                thresholds: cfg.thresholds,
                development_mode: cfg.development_mode,
                blacklist_confirmations: cfg.blacklist_confirmations,
            }),
        }
    }

    /// Screen one inbound call. Only a malformed number errors out; every
    /// internal failure past validation fails open.
    pub async fn screen_call(
        &self,
        number: &str,
        audio: Option<&AudioClip>,
    ) -> Result<ScreeningResult, ScreenError> {
        let number = phone::canonicalize(number)?;
        let started = Instant::now();

        let result = match self.screen_inner(&number, audio, started).await {
            Ok(result) => result,
            Err(err) => {
                counter!("screen_fail_open_total").increment(1);
                warn!(target: "screening", number = %number, error = ?err,
                      "screening failed internally; failing open");
                fail_open(&err, started)
            }
        };

        counter!("screen_calls_total", "action" => action_label(result.action)).increment(1);
        self.log_call(&number, &result).await;
        Ok(result)
    }

    async fn screen_inner(
        &self,
        number: &str,
        audio: Option<&AudioClip>,
        started: Instant,
    ) -> Result<ScreeningResult> {
        let inner = &self.inner;
        let features = inner.aggregator.collect(number, audio).await;
        let risk = calculate_risk_with(&features, &inner.weights, &inner.thresholds);

        let verification = match risk.action {
            ScreenAction::Blocked | ScreenAction::Challenge => {
                let code = inner.verification.generate_code(number).await?;
                Some(VerificationOffer {
                    code: code.code,
                    expires_at: code.expires_at,
                    message: "Enter the verification code to reach this line.".to_string(),
                })
            }
            ScreenAction::Allowed => None,
        };

        info!(target: "screening", number = %number, action = action_label(risk.action),
              score = risk.final_score, coverage = risk.coverage, "screened");

        Ok(ScreeningResult {
            action: risk.action,
            reason: risk.reason,
            risk: risk.final_score,
            confidence: risk.confidence,
            breakdown: risk.breakdown,
            coverage: risk.coverage,
            origin: risk.origin,
            features: feature_labels(&features),
            verification,
            metadata: metadata_for(&features, inner.development_mode, started),
        })
    }

    /// Screen many numbers; each chunk of 10 runs concurrently. A number
    /// that fails (validation, panic) is omitted from the map — one bad
    /// number never aborts the batch.
    pub async fn batch_screen(&self, numbers: &[String]) -> HashMap<String, ScreeningResult> {
        let mut results = HashMap::with_capacity(numbers.len());
        for chunk in numbers.chunks(BATCH_CHUNK) {
            let mut set = JoinSet::new();
            for number in chunk {
                let svc = self.clone();
                let number = number.clone();
                set.spawn(async move {
                    let result = svc.screen_call(&number, None).await;
                    (number, result)
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((number, Ok(result))) => {
                        results.insert(number, result);
                    }
                    Ok((number, Err(err))) => {
                        warn!(target: "screening", number = %number, error = %err,
                              "batch entry skipped");
                    }
                    Err(err) => {
                        warn!(target: "screening", error = ?err, "batch task panicked");
                    }
                }
            }
        }
        results
    }

    /// Best-effort audit record; a persistence failure is swallowed because
    /// losing a log line is preferable to failing a live call decision.
    pub async fn log_call(&self, number: &str, result: &ScreeningResult) {
        let entry = CallLogEntry {
            phone_number: number.to_string(),
            timestamp: Utc::now(),
            action: result.action,
            risk: result.risk,
            reason: result.reason.clone(),
            duration_secs: None,
        };
        if let Err(err) = self.inner.call_logs.append(entry).await {
            counter!("call_log_failures_total").increment(1);
            warn!(target: "screening", number = %number, error = ?err, "call log append failed");
        }
    }

    /// Confirm the newest community spam report against a number (atomic
    /// increment at the store). Reaching the configured confirmation count
    /// escalates the number to the blacklist and queues a reputation refresh.
    pub async fn confirm_spam_report(&self, number: &str) -> Result<u32, ScreenError> {
        let number = phone::canonicalize(number)?;
        let inner = &self.inner;
        let confirmations = match inner.spam_reports.add_confirmation(&number).await {
            Ok(n) => n,
            Err(err) => {
                warn!(target: "screening", number = %number, error = ?err, "confirmation failed");
                return Ok(0);
            }
        };
        if confirmations >= inner.blacklist_confirmations {
            if let Err(err) = inner.phone_numbers.set_entry(&number, ListEntry::Blacklist).await {
                warn!(target: "screening", number = %number, error = ?err,
                      "blacklist escalation failed");
            } else {
                counter!("blacklist_escalations_total").increment(1);
                info!(target: "screening", number = %number, confirmations,
                      "escalated to blacklist");
                inner.reputation.refresh_soon(&number);
            }
        }
        Ok(confirmations)
    }
}

fn action_label(action: ScreenAction) -> &'static str {
    match action {
        ScreenAction::Blocked => "blocked",
        ScreenAction::Allowed => "allowed",
        ScreenAction::Challenge => "challenge",
    }
}

fn feature_labels(features: &CallFeatures) -> Option<Vec<String>> {
    let mut labels = Vec::new();
    if let Some(voice) = &features.voice {
        labels.extend(voice.features.iter().cloned());
    }
    if let Some(scam) = &features.scam_phrases {
        labels.extend(scam.phrases.iter().cloned());
    }
    (!labels.is_empty()).then_some(labels)
}

fn metadata_for(features: &CallFeatures, development_mode: bool, started: Instant) -> ScreeningMetadata {
    let carrier = features.carrier.as_ref();
    ScreeningMetadata {
        carrier_name: carrier.map(|c| c.name.clone()),
        carrier_type: carrier.map(|c| {
            if c.is_mobile {
                "mobile".to_string()
            } else {
                "fixed".to_string()
            }
        }),
        line_type: carrier.map(|c| c.line_type.clone()),
        development_mode: development_mode.then_some(true),
        processing_time_ms: Some(started.elapsed().as_millis() as u64),
        error: None,
    }
}

/// The named fail-open outcome: allow at low confidence, tag the error.
fn fail_open(err: &anyhow::Error, started: Instant) -> ScreeningResult {
    ScreeningResult {
        action: ScreenAction::Allowed,
        reason: "Screening degraded; allowing call".to_string(),
        risk: 0.5,
        confidence: 0.1,
        breakdown: RiskBreakdown::default(),
        coverage: 0.0,
        origin: DecisionOrigin::FailOpen,
        features: None,
        verification: None,
        metadata: ScreeningMetadata {
            error: Some(err.to_string()),
            processing_time_ms: Some(started.elapsed().as_millis() as u64),
            ..Default::default()
        },
    }
}
