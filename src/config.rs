//! # Screening Config
//!
//! Runtime calibration for the decision core, loaded from a JSON file with a
//! built-in default seed as fallback (same loader shape as the rest of our
//! services: a missing or malformed file never prevents startup).
//!
//! - Blend weights and decision thresholds for the risk engine.
//! - Per-signal timeout for the aggregation fan-out.
//! - Reputation freshness window and batch-queue tuning.
//! - Trusted-carrier list and home country for the carrier-trust factor.
//! - Verification TTL and the attempt ceiling the HTTP layer enforces.

use serde::Deserialize;
use std::{fs, path::Path};

use crate::risk::{RiskThresholds, RiskWeights};

#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningConfig {
    #[serde(default)]
    pub weights: RiskWeights,
    #[serde(default)]
    pub thresholds: RiskThresholds,

    /// Bounded timeout around every external signal fetch, in milliseconds.
    /// A slow dependency degrades one category to absent, not the whole call.
    #[serde(default = "default_signal_timeout_ms")]
    pub signal_timeout_ms: u64,

    /// Skip voice analysis and mark results as development output.
    #[serde(default)]
    pub development_mode: bool,

    /// Stored reputation younger than this is served without recompute.
    #[serde(default = "default_reputation_fresh_secs")]
    pub reputation_fresh_secs: u64,

    /// Batch-queue flush trigger: pending entries.
    #[serde(default = "default_queue_max_pending")]
    pub queue_max_pending: usize,
    /// Batch-queue flush trigger: seconds after the first enqueue.
    #[serde(default = "default_queue_debounce_secs")]
    pub queue_debounce_secs: u64,

    /// ISO country code treated as domestic for carrier trust.
    #[serde(default = "default_home_country")]
    pub home_country: String,
    /// Lowercased carrier names granted the trusted-carrier bonus.
    #[serde(default = "default_trusted_carriers")]
    pub trusted_carriers: Vec<String>,

    /// Spam-report confirmations required to escalate a number to the blacklist.
    #[serde(default = "default_blacklist_confirmations")]
    pub blacklist_confirmations: u32,

    #[serde(default = "default_verification_ttl_mins")]
    pub verification_ttl_mins: i64,
    /// Verification attempts allowed per number per 24h; enforced one layer
    /// above the core by inspecting the attempt count.
    #[serde(default = "default_max_verification_attempts")]
    pub max_verification_attempts: u32,
}

fn default_signal_timeout_ms() -> u64 {
    2_000
}
fn default_reputation_fresh_secs() -> u64 {
    3_600
}
fn default_queue_max_pending() -> usize {
    50
}
fn default_queue_debounce_secs() -> u64 {
    5
}
fn default_home_country() -> String {
    "US".to_string()
}
fn default_trusted_carriers() -> Vec<String> {
    [
        "verizon",
        "at&t",
        "t-mobile",
        "sprint",
        "us cellular",
        "google fi",
        "vodafone",
        "rogers",
        "bell",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_blacklist_confirmations() -> u32 {
    3
}
fn default_verification_ttl_mins() -> i64 {
    15
}
fn default_max_verification_attempts() -> u32 {
    5
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            thresholds: RiskThresholds::default(),
            signal_timeout_ms: default_signal_timeout_ms(),
            development_mode: false,
            reputation_fresh_secs: default_reputation_fresh_secs(),
            queue_max_pending: default_queue_max_pending(),
            queue_debounce_secs: default_queue_debounce_secs(),
            home_country: default_home_country(),
            trusted_carriers: default_trusted_carriers(),
            blacklist_confirmations: default_blacklist_confirmations(),
            verification_ttl_mins: default_verification_ttl_mins(),
            max_verification_attempts: default_max_verification_attempts(),
        }
    }
}

impl ScreeningConfig {
    /// Load configuration from a JSON file.
    /// Falls back to the default seed on any read/parse error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn is_trusted_carrier(&self, name: &str) -> bool {
        let n = name.trim().to_ascii_lowercase();
        self.trusted_carriers.iter().any(|c| n.contains(c.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = ScreeningConfig::default();
        let w = c.weights;
        let sum = w.regulatory + w.community + w.behavioral + w.voice + w.ml + w.temporal;
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(c.thresholds.block > c.thresholds.challenge);
        assert_eq!(c.queue_max_pending, 50);
        assert_eq!(c.queue_debounce_secs, 5);
    }

    #[test]
    fn trusted_carrier_match_is_case_insensitive_substring() {
        let c = ScreeningConfig::default();
        assert!(c.is_trusted_carrier("Verizon Wireless"));
        assert!(c.is_trusted_carrier("T-MOBILE USA"));
        assert!(!c.is_trusted_carrier("Shady Telecom Ltd"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let c = ScreeningConfig::load_from_file("does-not-exist.json");
        assert_eq!(c.signal_timeout_ms, 2_000);
    }
}
