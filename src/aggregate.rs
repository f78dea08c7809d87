//! # Feature Aggregation
//! Fan-out/fan-in collection of every signal source into one `CallFeatures`
//! snapshot. All lookups run concurrently and join before scoring.
//!
//! Every fetch is wrapped in a bounded timeout with its own error guard: a
//! flaky or slow dependency degrades its category to "absent" instead of
//! stalling or aborting the screening call. The DNC check additionally
//! defaults to "not registered" per its trait contract.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tracing::warn;

use crate::features::{
    CallFeatures, CallHistory, CarrierInfo, CommunitySignals, ScamPhraseSignals, TemporalContext,
    VoiceSignals,
};
use crate::reputation::ReputationService;
use crate::signals::{
    AudioClip, CarrierLookup, DncCheck, DncResult, ScamPhraseDetector, SpamDatabaseCheck,
    SpamPredictor, VoiceSignalAnalyzer,
};
use crate::stores::{CallLogStore, PhoneNumberStore, SpamReportStore};

/// How confident voice analysis must be before the (expensive) scam-phrase
/// detector is consulted.
const SCAM_PHRASE_GATE: f32 = 0.7;

/// Window over which behavioral call history is aggregated.
const HISTORY_WINDOW_DAYS: i64 = 30;

/// The signal sources the aggregator fans out to. Voice, scam-phrase and ML
/// producers are optional; their categories stay absent when unwired.
pub struct SignalSources {
    pub carrier: Arc<dyn CarrierLookup>,
    pub spam_db: Arc<dyn SpamDatabaseCheck>,
    pub dnc: Arc<dyn DncCheck>,
    pub voice: Option<Arc<dyn VoiceSignalAnalyzer>>,
    pub scam_phrases: Option<Arc<dyn ScamPhraseDetector>>,
    pub ml: Option<Arc<dyn SpamPredictor>>,
}

pub struct FeatureAggregator {
    sources: SignalSources,
    phone_numbers: Arc<dyn PhoneNumberStore>,
    call_logs: Arc<dyn CallLogStore>,
    spam_reports: Arc<dyn SpamReportStore>,
    reputation: ReputationService,
    signal_timeout: Duration,
    development_mode: bool,
}

impl FeatureAggregator {
    pub fn new(
        sources: SignalSources,
        phone_numbers: Arc<dyn PhoneNumberStore>,
        call_logs: Arc<dyn CallLogStore>,
        spam_reports: Arc<dyn SpamReportStore>,
        reputation: ReputationService,
        signal_timeout: Duration,
        development_mode: bool,
    ) -> Self {
        Self {
            sources,
            phone_numbers,
            call_logs,
            spam_reports,
            reputation,
            signal_timeout,
            development_mode,
        }
    }

    /// Collect one snapshot for a (validated) number. Never fails: signal
    /// failures surface as absent categories.
    pub async fn collect(&self, number: &str, audio: Option<&AudioClip>) -> CallFeatures {
        let now = Utc::now();
        let window_start = now - chrono::Duration::days(HISTORY_WINDOW_DAYS);

        let run_voice = audio.is_some() && !self.development_mode && self.sources.voice.is_some();

        let (carrier, spam_db, dnc, record, stats, last_entry, reports, reputation, voice) = tokio::join!(
            self.guarded("carrier", self.sources.carrier.lookup(number)),
            self.guarded("spam-db", self.sources.spam_db.check(number)),
            self.bounded("dnc", self.sources.dnc.check(number)),
            self.guarded("phone-record", self.phone_numbers.find_by_number(number)),
            self.guarded("call-stats", self.call_logs.stats_since(number, window_start)),
            self.guarded("call-last", self.call_logs.last_entry(number)),
            self.guarded("spam-reports", self.spam_reports.reports_for(number)),
            self.bounded("reputation", self.reputation.reputation_for(number)),
            async {
                match (run_voice, audio, &self.sources.voice) {
                    (true, Some(clip), Some(analyzer)) => {
                        self.guarded("voice", analyzer.analyze(clip)).await
                    }
                    _ => None,
                }
            },
        );

        let mut features = CallFeatures::new(number, now);

        let carrier = carrier.flatten();
        features.carrier = carrier.map(|c| CarrierInfo {
            name: c.name,
            line_type: c.line_type,
            country: c.country,
            is_mobile: c.is_mobile,
        });

        // Regulatory flags merge three sources; the record is only Some when
        // at least one of them produced data.
        let record = record.flatten();
        let dnc = dnc.unwrap_or_else(DncResult::not_registered);
        if spam_db.is_some() || record.is_some() || dnc.is_registered {
            let entry = record.as_ref().and_then(|r| r.entry);
            features.regulatory = Some(crate::features::RegulatoryFlags {
                is_dnc: dnc.is_registered,
                is_spam_listed: spam_db.as_ref().map_or(false, |s| s.is_spam),
                is_whitelisted: entry == Some(crate::stores::ListEntry::Whitelist),
                is_blacklisted: entry == Some(crate::stores::ListEntry::Blacklist),
            });
        }

        let last_call_time = last_entry.flatten().map(|e| e.timestamp);
        features.call_history = stats.map(|s| CallHistory {
            total_calls: s.total_calls,
            blocked_calls: s.blocked_calls,
            block_rate: s.block_rate(),
            avg_call_duration_secs: s.avg_duration_secs,
            call_frequency: s.total_calls as f32 / HISTORY_WINDOW_DAYS as f32,
            last_call_time,
        });

        if let Some(reports) = reports {
            features.community = Some(CommunitySignals {
                spam_reports: reports.len() as u32,
                verified_reports: reports.iter().filter(|r| r.verified).count() as u32,
                reputation_score: reputation.as_ref().map(|r| r.score),
            });
        } else if let Some(reputation) = &reputation {
            // Reports unavailable but reputation resolved: partial community data.
            features.community = Some(CommunitySignals {
                spam_reports: 0,
                verified_reports: 0,
                reputation_score: Some(reputation.score),
            });
        }

        if let Some(analysis) = voice {
            // Scam-phrase detection only runs when voice analysis flags a
            // likely spam pattern; it needs the transcript and features.
            if analysis.is_spam && analysis.confidence > SCAM_PHRASE_GATE {
                if let Some(detector) = &self.sources.scam_phrases {
                    let transcript = analysis.transcript.clone().unwrap_or_default();
                    let detected = self
                        .guarded(
                            "scam-phrases",
                            detector.detect(&transcript, "en", &analysis.features),
                        )
                        .await;
                    features.scam_phrases = detected.map(|d| ScamPhraseSignals {
                        detected: d.is_scam,
                        confidence: d.confidence,
                        phrases: d.phrases,
                        category: d.category,
                    });
                }
            }
            features.voice = Some(VoiceSignals {
                is_robot: analysis.is_spam,
                confidence: analysis.confidence,
                features: analysis.features,
                patterns: analysis.patterns,
            });
        }

        if let Some(predictor) = &self.sources.ml {
            features.ml = self
                .guarded("ml", predictor.predict(number, features.call_history.as_ref()))
                .await;
        }

        features.temporal = Some(TemporalContext::derive(now, last_call_time));

        features
    }

    /// Timeout + error isolation around a fallible signal fetch.
    async fn guarded<T>(
        &self,
        signal: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.signal_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                counter!("signal_failures_total", "signal" => signal).increment(1);
                warn!(target: "aggregate", signal, error = ?err, "signal failed, degrading to absent");
                None
            }
            Err(_) => {
                counter!("signal_timeouts_total", "signal" => signal).increment(1);
                warn!(target: "aggregate", signal, "signal timed out, degrading to absent");
                None
            }
        }
    }

    /// Timeout around an infallible fetch.
    async fn bounded<T>(&self, signal: &'static str, fut: impl Future<Output = T>) -> Option<T> {
        match tokio::time::timeout(self.signal_timeout, fut).await {
            Ok(value) => Some(value),
            Err(_) => {
                counter!("signal_timeouts_total", "signal" => signal).increment(1);
                warn!(target: "aggregate", signal, "signal timed out, degrading to absent");
                None
            }
        }
    }
}
