//! # Risk Engine
//! Pure, testable logic that maps `CallFeatures` → `RiskScore`.
//! No I/O, no clock reads; identical input always yields identical output,
//! which is what makes every decision auditable after the fact.
//!
//! Policy: hard list overrides (blacklist/whitelist/spam-database) bypass
//! the weighted blend entirely; otherwise six category scores are combined
//! with fixed weights and thresholded into block / challenge / allow.

use serde::{Deserialize, Serialize};

use crate::features::CallFeatures;

/// Outcome of screening one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenAction {
    Blocked,
    Allowed,
    Challenge,
}

/// Where the decision came from. `FailOpen` is a first-class outcome so the
/// availability-over-blocking trade-off stays visible in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrigin {
    Scored,
    HardOverride,
    FailOpen,
}

/// Per-category risk contributions, each in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub regulatory: f32,
    pub community: f32,
    pub behavioral: f32,
    pub voice: f32,
    pub ml: f32,
    pub temporal: f32,
}

/// Fixed blend weights; they sum to 1.0 so `final_score` stays in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub regulatory: f32,
    pub community: f32,
    pub behavioral: f32,
    pub voice: f32,
    pub ml: f32,
    pub temporal: f32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            regulatory: 0.25,
            community: 0.20,
            behavioral: 0.15,
            voice: 0.15,
            ml: 0.15,
            temporal: 0.10,
        }
    }
}

/// Decision thresholds on the blended score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub block: f32,
    pub challenge: f32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            block: 0.70,
            challenge: 0.40,
        }
    }
}

/// The engine's output: score, action, auditable breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub final_score: f32,
    pub action: ScreenAction,
    pub reason: String,
    pub confidence: f32,
    pub breakdown: RiskBreakdown,
    /// Fraction of the six categories that actually had data, in [0,1].
    /// Absent signals score zero risk; this value keeps that visible.
    pub coverage: f32,
    pub origin: DecisionOrigin,
}

/// Score a call with the default weights and thresholds.
pub fn calculate_risk(features: &CallFeatures) -> RiskScore {
    calculate_risk_with(features, &RiskWeights::default(), &RiskThresholds::default())
}

/// Score a call with explicit calibration (used by the orchestrator, which
/// carries weights/thresholds in its config).
pub fn calculate_risk_with(
    features: &CallFeatures,
    weights: &RiskWeights,
    thresholds: &RiskThresholds,
) -> RiskScore {
    let breakdown = RiskBreakdown {
        regulatory: regulatory_score(features),
        community: community_score(features),
        behavioral: behavioral_score(features),
        voice: voice_score(features),
        ml: ml_score(features),
        temporal: temporal_score(features),
    };

    let final_score = clamp01(
        breakdown.regulatory * weights.regulatory
            + breakdown.community * weights.community
            + breakdown.behavioral * weights.behavioral
            + breakdown.voice * weights.voice
            + breakdown.ml * weights.ml
            + breakdown.temporal * weights.temporal,
    );

    let coverage = coverage_of(features);
    let flags = features.regulatory.unwrap_or_default();

    // Hard overrides first; they carry their own reason and confidence.
    if flags.is_blacklisted {
        return RiskScore {
            final_score,
            action: ScreenAction::Blocked,
            reason: "Number is blacklisted".to_string(),
            confidence: 1.0,
            breakdown,
            coverage,
            origin: DecisionOrigin::HardOverride,
        };
    }
    if flags.is_whitelisted {
        return RiskScore {
            final_score,
            action: ScreenAction::Allowed,
            reason: "Number is whitelisted".to_string(),
            confidence: 1.0,
            breakdown,
            coverage,
            origin: DecisionOrigin::HardOverride,
        };
    }
    if flags.is_spam_listed {
        return RiskScore {
            final_score,
            action: ScreenAction::Blocked,
            reason: "Number is listed in the national spam database".to_string(),
            confidence: 0.95,
            breakdown,
            coverage,
            origin: DecisionOrigin::HardOverride,
        };
    }

    let (action, confidence) = if final_score >= thresholds.block {
        (ScreenAction::Blocked, final_score.min(0.95))
    } else if final_score >= thresholds.challenge {
        (ScreenAction::Challenge, final_score)
    } else {
        (ScreenAction::Allowed, 1.0 - final_score)
    };

    RiskScore {
        final_score,
        action,
        reason: describe(&breakdown, action),
        confidence,
        breakdown,
        coverage,
        origin: DecisionOrigin::Scored,
    }
}

// ── Category scoring ────────────────────────────────────────────────────────

fn regulatory_score(features: &CallFeatures) -> f32 {
    let Some(flags) = features.regulatory else {
        return 0.0;
    };
    if flags.is_blacklisted {
        return 1.0;
    }
    if flags.is_whitelisted {
        return 0.0;
    }
    let mut score = 0.0;
    if flags.is_spam_listed {
        score += 0.9;
    }
    if flags.is_dnc {
        score += 0.8;
    }
    clamp01(score)
}

fn community_score(features: &CallFeatures) -> f32 {
    let Some(community) = &features.community else {
        return 0.0;
    };
    let reputation_risk = match community.reputation_score {
        Some(score) => (100.0 - score) / 100.0,
        None => 0.5,
    };
    let report_risk = (community.spam_reports as f32 / 10.0).min(0.9);
    let verified_risk = (community.verified_reports as f32 / 5.0).min(1.0);
    clamp01(reputation_risk * 0.4 + report_risk * 0.3 + verified_risk * 0.3)
}

fn behavioral_score(features: &CallFeatures) -> f32 {
    let Some(history) = &features.call_history else {
        return 0.0;
    };
    let mut score = history.block_rate * 0.5;
    if history.call_frequency > 3.0 {
        score += ((history.call_frequency - 3.0) / 10.0).min(0.3);
    }
    if history.avg_call_duration_secs < 10.0 {
        score += 0.2;
    }
    if history.total_calls > 5 && history.block_rate > 0.6 {
        score += 0.3;
    }
    clamp01(score)
}

fn voice_score(features: &CallFeatures) -> f32 {
    let Some(voice) = &features.voice else {
        return 0.0;
    };
    let mut score = 0.0;
    if voice.is_robot {
        score += voice.confidence * 0.6;
    }
    if let Some(naturalness) = voice.patterns.naturalness {
        if naturalness < 0.3 {
            score += 0.3;
        }
    }
    if voice.patterns.rhythm_regularity > 0.8 {
        score += 0.2;
    }
    let energy = voice.patterns.energy;
    if !(0.1..=0.9).contains(&energy) {
        score += 0.1;
    }
    clamp01(score)
}

fn ml_score(features: &CallFeatures) -> f32 {
    let Some(ml) = &features.ml else {
        return 0.0;
    };
    // Low-confidence predictions are damped toward half their raw probability.
    clamp01(ml.spam_probability * (0.5 + ml.confidence * 0.5))
}

fn temporal_score(features: &CallFeatures) -> f32 {
    let Some(temporal) = features.temporal else {
        return 0.0;
    };
    let mut score = 0.0;
    if !temporal.is_business_hours {
        if temporal.hour_of_day < 8 || temporal.hour_of_day > 21 {
            score += 0.3;
        } else {
            score += 0.1;
        }
    }
    if let Some(since) = temporal.time_since_last_call_secs {
        if since < 3600 {
            score += 0.3;
        }
    }
    clamp01(score)
}

fn coverage_of(features: &CallFeatures) -> f32 {
    let present = [
        features.regulatory.is_some(),
        features.community.is_some(),
        features.call_history.is_some(),
        features.voice.is_some(),
        features.ml.is_some(),
        features.temporal.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    present as f32 / 6.0
}

// ── Reason text ─────────────────────────────────────────────────────────────

const REASON_FLOOR: f32 = 0.3;

fn describe(breakdown: &RiskBreakdown, action: ScreenAction) -> String {
    let mut named = [
        ("regulatory listing", breakdown.regulatory),
        ("community spam reports", breakdown.community),
        ("calling behavior", breakdown.behavioral),
        ("robotic voice characteristics", breakdown.voice),
        ("machine-learned spam likelihood", breakdown.ml),
        ("unusual calling time", breakdown.temporal),
    ];
    named.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let top: Vec<&str> = named
        .iter()
        .take(2)
        .filter(|(_, v)| *v > REASON_FLOOR)
        .map(|(label, _)| *label)
        .collect();

    match (action, top.as_slice()) {
        (_, [a, b, ..]) => format!("Elevated risk from {a} and {b}"),
        (_, [a]) => format!("Elevated risk from {a}"),
        (ScreenAction::Allowed, []) => "No significant risk indicators".to_string(),
        (_, []) => "Combined risk across several weak indicators".to_string(),
    }
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{
        CallHistory, CommunitySignals, MlPrediction, RegulatoryFlags, TemporalContext,
        VoicePatterns, VoiceSignals,
    };
    use chrono::{TimeZone, Utc};

    fn base_features() -> CallFeatures {
        CallFeatures::new(
            "+15550100199",
            Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn empty_features_allow_with_high_confidence() {
        let risk = calculate_risk(&base_features());
        assert_eq!(risk.action, ScreenAction::Allowed);
        assert_eq!(risk.final_score, 0.0);
        assert_eq!(risk.confidence, 1.0);
        assert_eq!(risk.coverage, 0.0);
        assert_eq!(risk.origin, DecisionOrigin::Scored);
    }

    #[test]
    fn blacklist_forces_block_regardless_of_everything_else() {
        let mut f = base_features();
        f.regulatory = Some(RegulatoryFlags {
            is_whitelisted: true, // blacklist wins over whitelist
            is_blacklisted: true,
            ..Default::default()
        });
        f.community = Some(CommunitySignals {
            spam_reports: 0,
            verified_reports: 0,
            reputation_score: Some(100.0),
        });
        let risk = calculate_risk(&f);
        assert_eq!(risk.action, ScreenAction::Blocked);
        assert_eq!(risk.confidence, 1.0);
        assert_eq!(risk.origin, DecisionOrigin::HardOverride);
        assert_eq!(risk.breakdown.regulatory, 1.0);
    }

    #[test]
    fn whitelist_forces_allow() {
        let mut f = base_features();
        f.regulatory = Some(RegulatoryFlags {
            is_whitelisted: true,
            is_dnc: true, // ignored under the override
            ..Default::default()
        });
        let risk = calculate_risk(&f);
        assert_eq!(risk.action, ScreenAction::Allowed);
        assert_eq!(risk.confidence, 1.0);
        assert_eq!(risk.breakdown.regulatory, 0.0);
    }

    #[test]
    fn spam_listing_blocks_at_095_and_names_the_database() {
        let mut f = base_features();
        f.regulatory = Some(RegulatoryFlags {
            is_spam_listed: true,
            ..Default::default()
        });
        let risk = calculate_risk(&f);
        assert_eq!(risk.action, ScreenAction::Blocked);
        assert!((risk.confidence - 0.95).abs() < 1e-6);
        assert!(risk.reason.contains("national spam database"));
    }

    #[test]
    fn dnc_and_spam_listing_are_additive_then_clamped() {
        let mut f = base_features();
        f.regulatory = Some(RegulatoryFlags {
            is_dnc: true,
            is_spam_listed: true,
            ..Default::default()
        });
        let risk = calculate_risk(&f);
        assert_eq!(risk.breakdown.regulatory, 1.0); // 0.9 + 0.8 clamped
    }

    #[test]
    fn final_score_is_the_weighted_sum_of_the_breakdown() {
        let mut f = base_features();
        f.community = Some(CommunitySignals {
            spam_reports: 8,
            verified_reports: 2,
            reputation_score: Some(20.0),
        });
        f.call_history = Some(CallHistory {
            total_calls: 12,
            blocked_calls: 9,
            block_rate: 0.75,
            avg_call_duration_secs: 6.0,
            call_frequency: 7.0,
            last_call_time: None,
        });
        f.voice = Some(VoiceSignals {
            is_robot: true,
            confidence: 0.9,
            features: vec![],
            patterns: VoicePatterns {
                energy: 0.95,
                zero_crossings: 0.4,
                rhythm_regularity: 0.85,
                naturalness: Some(0.2),
            },
        });
        f.ml = Some(MlPrediction {
            spam_probability: 0.8,
            confidence: 0.5,
            factors: vec![],
        });
        f.temporal = Some(TemporalContext {
            hour_of_day: 23,
            day_of_week: 3,
            is_business_hours: false,
            time_since_last_call_secs: Some(120),
        });

        let w = RiskWeights::default();
        let risk = calculate_risk(&f);
        let b = risk.breakdown;
        let expected = b.regulatory * w.regulatory
            + b.community * w.community
            + b.behavioral * w.behavioral
            + b.voice * w.voice
            + b.ml * w.ml
            + b.temporal * w.temporal;
        assert!((risk.final_score - expected).abs() < 1e-6);
        for v in [b.regulatory, b.community, b.behavioral, b.voice, b.ml, b.temporal] {
            assert!((0.0..=1.0).contains(&v));
        }
        assert!((0.0..=1.0).contains(&risk.final_score));
    }

    #[test]
    fn ml_confidence_damps_raw_probability() {
        let mut f = base_features();
        f.ml = Some(MlPrediction {
            spam_probability: 0.8,
            confidence: 0.0,
            factors: vec![],
        });
        let low = calculate_risk(&f).breakdown.ml;
        assert!((low - 0.4).abs() < 1e-6);

        f.ml = Some(MlPrediction {
            spam_probability: 0.8,
            confidence: 1.0,
            factors: vec![],
        });
        let high = calculate_risk(&f).breakdown.ml;
        assert!((high - 0.8).abs() < 1e-6);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let mut f = base_features();
        f.community = Some(CommunitySignals {
            spam_reports: 4,
            verified_reports: 1,
            reputation_score: Some(35.0),
        });
        f.temporal = Some(TemporalContext {
            hour_of_day: 22,
            day_of_week: 2,
            is_business_hours: false,
            time_since_last_call_secs: Some(400),
        });
        let a = calculate_risk(&f);
        let b = calculate_risk(&f);
        assert_eq!(a, b);
    }

    #[test]
    fn challenge_band_uses_score_as_confidence() {
        let mut f = base_features();
        f.community = Some(CommunitySignals {
            spam_reports: 10,
            verified_reports: 5,
            reputation_score: Some(0.0),
        });
        f.call_history = Some(CallHistory {
            total_calls: 10,
            blocked_calls: 9,
            block_rate: 0.9,
            avg_call_duration_secs: 5.0,
            call_frequency: 8.0,
            last_call_time: None,
        });
        f.temporal = Some(TemporalContext {
            hour_of_day: 23,
            day_of_week: 6,
            is_business_hours: false,
            time_since_last_call_secs: Some(60),
        });
        let risk = calculate_risk(&f);
        assert_eq!(risk.action, ScreenAction::Challenge);
        assert!((risk.confidence - risk.final_score).abs() < 1e-6);
        assert!(risk.reason.contains("community spam reports"));
    }

    #[test]
    fn late_night_burst_scores_the_temporal_category() {
        let mut f = base_features();
        f.temporal = Some(TemporalContext {
            hour_of_day: 23,
            day_of_week: 2,
            is_business_hours: false,
            time_since_last_call_secs: Some(300),
        });
        assert!((calculate_risk(&f).breakdown.temporal - 0.6).abs() < 1e-6);

        // Evening but not deep night: softer penalty.
        f.temporal = Some(TemporalContext {
            hour_of_day: 19,
            day_of_week: 6,
            is_business_hours: false,
            time_since_last_call_secs: None,
        });
        assert!((calculate_risk(&f).breakdown.temporal - 0.1).abs() < 1e-6);
    }
}
