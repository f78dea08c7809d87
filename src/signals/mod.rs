// src/signals/mod.rs
//! External signal sources consulted during aggregation. Each is a narrow
//! async trait so the orchestrator can be wired against live HTTP clients,
//! hardware-adjacent services, or mocks.
//!
//! Voice analysis, scam-phrase detection and the ML predictor are optional
//! producers: the aggregator runs without them and the affected categories
//! simply stay absent.

pub mod http;
pub mod sim;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::{CallHistory, MlPrediction, VoicePatterns};

/// Carrier/line-type lookup result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierRecord {
    pub name: String,
    pub line_type: String,
    pub country: String,
    pub is_mobile: bool,
}

#[async_trait::async_trait]
pub trait CarrierLookup: Send + Sync {
    async fn lookup(&self, number: &str) -> Result<Option<CarrierRecord>>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamDbResult {
    pub is_spam: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[async_trait::async_trait]
pub trait SpamDatabaseCheck: Send + Sync {
    async fn check(&self, number: &str) -> Result<SpamDbResult>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DncResult {
    pub is_registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<DateTime<Utc>>,
}

impl DncResult {
    pub fn not_registered() -> Self {
        Self {
            is_registered: false,
            registration_date: None,
        }
    }
}

/// Do-not-call registry check. Contract: must not fail — implementations
/// default to "not registered" on their own errors.
#[async_trait::async_trait]
pub trait DncCheck: Send + Sync {
    async fn check(&self, number: &str) -> DncResult;
    fn name(&self) -> &'static str;
}

/// Raw audio handed to `screen_call` by the device layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<u8>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAnalysis {
    pub is_spam: bool,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    pub patterns: VoicePatterns,
    /// Best-effort transcript, input to scam-phrase detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[async_trait::async_trait]
pub trait VoiceSignalAnalyzer: Send + Sync {
    async fn analyze(&self, audio: &AudioClip) -> Result<VoiceAnalysis>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScamPhraseResult {
    pub is_scam: bool,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phrases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[async_trait::async_trait]
pub trait ScamPhraseDetector: Send + Sync {
    async fn detect(
        &self,
        transcript: &str,
        language: &str,
        audio_features: &[String],
    ) -> Result<ScamPhraseResult>;
    fn name(&self) -> &'static str;
}

/// Optional machine-learned spam-probability producer.
#[async_trait::async_trait]
pub trait SpamPredictor: Send + Sync {
    async fn predict(&self, number: &str, history: Option<&CallHistory>) -> Result<MlPrediction>;
    fn name(&self) -> &'static str;
}
