//! # Call Features
//! The aggregated, per-attempt snapshot of everything known about one
//! inbound call: carrier data, call history, community reports, voice
//! analysis, ML prediction, regulatory flags, scam phrases and timing.
//!
//! Every sub-record is optional. An absent record means the signal had no
//! data (or its source failed and was degraded to absent) and contributes
//! zero risk to its category; the engine reports data-completeness
//! separately so absence is never silently mistaken for "benign".

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// One snapshot per screening attempt. Built by the aggregator, consumed by
/// the risk engine, logged for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFeatures {
    pub phone_number: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<CarrierInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_history: Option<CallHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community: Option<CommunitySignals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceSignals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml: Option<MlPrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulatory: Option<RegulatoryFlags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scam_phrases: Option<ScamPhraseSignals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalContext>,
}

impl CallFeatures {
    /// Empty snapshot; the aggregator fills in whatever signals resolve.
    pub fn new(phone_number: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            phone_number: phone_number.into(),
            timestamp,
            carrier: None,
            call_history: None,
            community: None,
            voice: None,
            ml: None,
            regulatory: None,
            scam_phrases: None,
            temporal: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierInfo {
    pub name: String,
    pub line_type: String,
    pub country: String,
    pub is_mobile: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallHistory {
    pub total_calls: u64,
    pub blocked_calls: u64,
    /// blocked / total over the observed window, in [0,1].
    pub block_rate: f32,
    pub avg_call_duration_secs: f32,
    /// Calls per day over the observed window.
    pub call_frequency: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_call_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySignals {
    pub spam_reports: u32,
    pub verified_reports: u32,
    /// Trust score 0..100 from the reputation subsystem, if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePatterns {
    pub energy: f32,
    pub zero_crossings: f32,
    pub rhythm_regularity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naturalness: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSignals {
    pub is_robot: bool,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    pub patterns: VoicePatterns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    pub spam_probability: f32,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatoryFlags {
    /// Number is on the do-not-call registry.
    pub is_dnc: bool,
    /// Number is listed in the national spam database.
    pub is_spam_listed: bool,
    pub is_whitelisted: bool,
    pub is_blacklisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScamPhraseSignals {
    pub detected: bool,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phrases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    /// 0..=23 local to the service clock (UTC unless configured otherwise).
    pub hour_of_day: u32,
    /// 1 = Monday .. 7 = Sunday.
    pub day_of_week: u32,
    pub is_business_hours: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_since_last_call_secs: Option<u64>,
}

impl TemporalContext {
    /// Derive the timing context from the call timestamp and the previous
    /// call, if any. This is the only place wall-clock context enters the
    /// feature set; the engine itself never reads a clock.
    pub fn derive(at: DateTime<Utc>, last_call: Option<DateTime<Utc>>) -> Self {
        let hour = at.hour();
        let weekday = at.weekday();
        let business_day = !matches!(weekday, Weekday::Sat | Weekday::Sun);
        let since_last = last_call.and_then(|prev| {
            let delta = at.signed_duration_since(prev);
            (delta.num_seconds() >= 0).then_some(delta.num_seconds() as u64)
        });

        Self {
            hour_of_day: hour,
            day_of_week: weekday.number_from_monday(),
            is_business_hours: business_day && (9..17).contains(&hour),
            time_since_last_call_secs: since_last,
        }
    }
}
