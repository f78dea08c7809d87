// src/signals/sim.rs
//! Simulated signal sources for the dev/simulated environment and tests.
//! Deterministic, in-memory, no network. The dev entrypoint wires these in
//! when no upstream URLs are configured.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;

use super::{
    AudioClip, CarrierLookup, CarrierRecord, DncCheck, DncResult, ScamPhraseDetector,
    ScamPhraseResult, SpamDatabaseCheck, SpamDbResult, VoiceAnalysis, VoiceSignalAnalyzer,
};

#[derive(Debug, Default)]
pub struct SimCarrierLookup {
    records: Mutex<Vec<(String, CarrierRecord)>>,
}

impl SimCarrierLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, number: &str, record: CarrierRecord) {
        let mut v = self.records.lock().expect("sim carrier mutex poisoned");
        v.push((number.to_string(), record));
    }
}

#[async_trait::async_trait]
impl CarrierLookup for SimCarrierLookup {
    async fn lookup(&self, number: &str) -> Result<Option<CarrierRecord>> {
        let v = self.records.lock().expect("sim carrier mutex poisoned");
        Ok(v.iter()
            .find(|(n, _)| n == number)
            .map(|(_, r)| r.clone()))
    }

    fn name(&self) -> &'static str {
        "carrier-sim"
    }
}

#[derive(Debug, Default)]
pub struct SimSpamDatabase {
    listed: Mutex<HashSet<String>>,
}

impl SimSpamDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, number: &str) {
        let mut s = self.listed.lock().expect("sim spam-db mutex poisoned");
        s.insert(number.to_string());
    }
}

#[async_trait::async_trait]
impl SpamDatabaseCheck for SimSpamDatabase {
    async fn check(&self, number: &str) -> Result<SpamDbResult> {
        let s = self.listed.lock().expect("sim spam-db mutex poisoned");
        let is_spam = s.contains(number);
        Ok(SpamDbResult {
            is_spam,
            details: is_spam.then(|| "listed in simulated spam database".to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "spam-db-sim"
    }
}

#[derive(Debug, Default)]
pub struct SimDncRegistry {
    registered: Mutex<HashSet<String>>,
}

impl SimDncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, number: &str) {
        let mut s = self.registered.lock().expect("sim dnc mutex poisoned");
        s.insert(number.to_string());
    }
}

#[async_trait::async_trait]
impl DncCheck for SimDncRegistry {
    async fn check(&self, number: &str) -> DncResult {
        let s = self.registered.lock().expect("sim dnc mutex poisoned");
        DncResult {
            is_registered: s.contains(number),
            registration_date: None,
        }
    }

    fn name(&self) -> &'static str {
        "dnc-sim"
    }
}

/// Always returns the same canned analysis.
#[derive(Debug, Clone)]
pub struct SimVoiceAnalyzer {
    pub analysis: VoiceAnalysis,
}

#[async_trait::async_trait]
impl VoiceSignalAnalyzer for SimVoiceAnalyzer {
    async fn analyze(&self, _audio: &AudioClip) -> Result<VoiceAnalysis> {
        Ok(self.analysis.clone())
    }

    fn name(&self) -> &'static str {
        "voice-sim"
    }
}

/// Always returns the same canned detection.
#[derive(Debug, Clone)]
pub struct SimScamPhraseDetector {
    pub result: ScamPhraseResult,
}

#[async_trait::async_trait]
impl ScamPhraseDetector for SimScamPhraseDetector {
    async fn detect(
        &self,
        _transcript: &str,
        _language: &str,
        _audio_features: &[String],
    ) -> Result<ScamPhraseResult> {
        Ok(self.result.clone())
    }

    fn name(&self) -> &'static str {
        "scam-phrases-sim"
    }
}
