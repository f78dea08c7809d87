// tests/screening.rs
//
// Orchestrator behavior end-to-end against in-memory stores and simulated
// signal sources: overrides flow through, verification codes attach to
// block/challenge outcomes, batch screening isolates bad numbers, internal
// failures fail open, and slow signals degrade instead of stalling.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;

use call_sentinel::aggregate::{FeatureAggregator, SignalSources};
use call_sentinel::config::ScreeningConfig;
use call_sentinel::reputation::ReputationService;
use call_sentinel::risk::{DecisionOrigin, ScreenAction};
use call_sentinel::screening::ScreeningService;
use call_sentinel::signals::sim::{SimCarrierLookup, SimDncRegistry, SimSpamDatabase};
use call_sentinel::signals::{CarrierLookup, CarrierRecord};
use call_sentinel::stores::memory::{
    MemoryCallLogStore, MemoryPhoneNumberStore, MemorySpamReportStore,
    MemoryVerificationCodeStore,
};
use call_sentinel::stores::{ListEntry, PhoneNumberStore, VerificationCode, VerificationCodeStore};
use call_sentinel::verification::VerificationService;

const NUMBER: &str = "+15550100199";

struct Harness {
    phone_numbers: Arc<MemoryPhoneNumberStore>,
    call_logs: Arc<MemoryCallLogStore>,
    spam_reports: Arc<MemorySpamReportStore>,
    spam_db: Arc<SimSpamDatabase>,
    svc: ScreeningService,
}

fn build(codes: Arc<dyn VerificationCodeStore>, carrier: Arc<dyn CarrierLookup>) -> Harness {
    let cfg = ScreeningConfig::default();
    let phone_numbers = Arc::new(MemoryPhoneNumberStore::new());
    let call_logs = Arc::new(MemoryCallLogStore::new());
    let spam_reports = Arc::new(MemorySpamReportStore::new());
    let spam_db = Arc::new(SimSpamDatabase::new());
    let dnc = Arc::new(SimDncRegistry::new());

    let reputation = ReputationService::new(
        &cfg,
        phone_numbers.clone(),
        call_logs.clone(),
        spam_reports.clone(),
        carrier.clone(),
        None,
    );
    let aggregator = FeatureAggregator::new(
        SignalSources {
            carrier,
            spam_db: spam_db.clone(),
            dnc,
            voice: None,
            scam_phrases: None,
            ml: None,
        },
        phone_numbers.clone(),
        call_logs.clone(),
        spam_reports.clone(),
        reputation.clone(),
        Duration::from_millis(cfg.signal_timeout_ms),
        cfg.development_mode,
    );
    let verification = Arc::new(VerificationService::new(codes, phone_numbers.clone(), 15));
    let svc = ScreeningService::new(
        &cfg,
        aggregator,
        verification,
        call_logs.clone(),
        spam_reports.clone(),
        phone_numbers.clone(),
        reputation,
    );

    Harness {
        phone_numbers,
        call_logs,
        spam_reports,
        spam_db,
        svc,
    }
}

fn harness() -> Harness {
    build(
        Arc::new(MemoryVerificationCodeStore::new()),
        Arc::new(SimCarrierLookup::new()),
    )
}

#[tokio::test]
async fn clean_number_is_allowed_and_logged() {
    let h = harness();
    let result = h.svc.screen_call(NUMBER, None).await.unwrap();
    assert_eq!(result.action, ScreenAction::Allowed);
    assert_eq!(result.origin, DecisionOrigin::Scored);
    assert!(result.verification.is_none());
    assert!(result.risk < 0.40);
    // The outcome was persisted to the call log.
    assert_eq!(h.call_logs.len(), 1);
}

#[tokio::test]
async fn spam_database_listing_blocks_and_offers_a_challenge() {
    let h = harness();
    h.spam_db.list(NUMBER);

    let result = h.svc.screen_call(NUMBER, None).await.unwrap();
    assert_eq!(result.action, ScreenAction::Blocked);
    assert!((result.confidence - 0.95).abs() < 1e-6);
    assert!(result.reason.contains("national spam database"));

    let offer = result
        .verification
        .expect("blocked call carries a challenge code");
    assert_eq!(offer.code.len(), 6);
    assert!(offer.code.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn blacklisted_number_blocks_with_full_confidence() {
    let h = harness();
    h.phone_numbers
        .set_entry(NUMBER, ListEntry::Blacklist)
        .await
        .unwrap();

    let result = h.svc.screen_call(NUMBER, None).await.unwrap();
    assert_eq!(result.action, ScreenAction::Blocked);
    assert_eq!(result.confidence, 1.0);
    assert_eq!(result.origin, DecisionOrigin::HardOverride);
}

#[tokio::test]
async fn whitelisted_number_is_always_allowed() {
    let h = harness();
    h.phone_numbers
        .set_entry(NUMBER, ListEntry::Whitelist)
        .await
        .unwrap();
    h.spam_db.list(NUMBER); // even while spam-listed

    let result = h.svc.screen_call(NUMBER, None).await.unwrap();
    assert_eq!(result.action, ScreenAction::Allowed);
    assert_eq!(result.confidence, 1.0);
}

#[tokio::test]
async fn carrier_metadata_flows_into_the_result() {
    let carrier = Arc::new(SimCarrierLookup::new());
    carrier.seed(
        NUMBER,
        CarrierRecord {
            name: "Verizon Wireless".to_string(),
            line_type: "wireless".to_string(),
            country: "US".to_string(),
            is_mobile: true,
        },
    );
    let h = build(Arc::new(MemoryVerificationCodeStore::new()), carrier);

    let result = h.svc.screen_call(NUMBER, None).await.unwrap();
    assert_eq!(
        result.metadata.carrier_name.as_deref(),
        Some("Verizon Wireless")
    );
    assert_eq!(result.metadata.carrier_type.as_deref(), Some("mobile"));
    assert_eq!(result.metadata.line_type.as_deref(), Some("wireless"));
    assert!(result.metadata.processing_time_ms.is_some());
}

#[tokio::test]
async fn invalid_number_is_rejected_before_aggregation() {
    let h = harness();
    assert!(h.svc.screen_call("not a number", None).await.is_err());
    assert_eq!(h.call_logs.len(), 0);
}

#[tokio::test]
async fn batch_omits_the_bad_number_and_keeps_the_rest() {
    let h = harness();
    let numbers = vec![
        "+15550000001".to_string(),
        "bogus".to_string(),
        "+15550000003".to_string(),
    ];
    let results = h.svc.batch_screen(&numbers).await;
    assert_eq!(results.len(), 2);
    assert!(results.contains_key("+15550000001"));
    assert!(results.contains_key("+15550000003"));
    assert!(!results.contains_key("bogus"));
}

/// Verification store whose writes always fail: forces an internal error on
/// the block path so the fail-open outcome can be asserted directly.
struct FailingVerificationStore;

#[async_trait::async_trait]
impl VerificationCodeStore for FailingVerificationStore {
    async fn insert(&self, _code: VerificationCode) -> Result<()> {
        Err(anyhow!("verification store down"))
    }
    async fn consume(&self, _n: &str, _c: &str, _now: chrono::DateTime<Utc>) -> Result<bool> {
        Err(anyhow!("verification store down"))
    }
    async fn record_attempt(&self, _n: &str, _at: chrono::DateTime<Utc>) -> Result<()> {
        Err(anyhow!("verification store down"))
    }
    async fn attempts_since(&self, _n: &str, _s: chrono::DateTime<Utc>) -> Result<u32> {
        Err(anyhow!("verification store down"))
    }
}

#[tokio::test]
async fn internal_failure_past_validation_fails_open() {
    let h = build(
        Arc::new(FailingVerificationStore),
        Arc::new(SimCarrierLookup::new()),
    );
    // Spam listing forces a block decision, whose code issuance then fails.
    h.spam_db.list(NUMBER);

    let result = h.svc.screen_call(NUMBER, None).await.unwrap();
    assert_eq!(result.action, ScreenAction::Allowed);
    assert_eq!(result.origin, DecisionOrigin::FailOpen);
    assert!((result.risk - 0.5).abs() < 1e-6);
    assert!((result.confidence - 0.1).abs() < 1e-6);
    assert!(result.metadata.error.is_some());
    // Fail-open outcomes are still best-effort logged.
    assert_eq!(h.call_logs.len(), 1);
}

/// Carrier lookup that never answers within the signal timeout.
struct SlowCarrier;

#[async_trait::async_trait]
impl CarrierLookup for SlowCarrier {
    async fn lookup(&self, _number: &str) -> Result<Option<CarrierRecord>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }
    fn name(&self) -> &'static str {
        "carrier-slow"
    }
}

#[tokio::test(start_paused = true)]
async fn a_stalled_signal_degrades_to_absent_instead_of_stalling_the_call() {
    let h = build(
        Arc::new(MemoryVerificationCodeStore::new()),
        Arc::new(SlowCarrier),
    );

    let result = h.svc.screen_call(NUMBER, None).await.unwrap();
    // The call completed without the carrier category.
    assert_eq!(result.action, ScreenAction::Allowed);
    assert!(result.metadata.carrier_name.is_none());
    assert_eq!(result.origin, DecisionOrigin::Scored);
}

#[tokio::test]
async fn confirmed_reports_escalate_to_the_blacklist() {
    use call_sentinel::stores::{ReportStatus, SpamReport, SpamReportStore};

    let h = harness();
    // Nothing to confirm yet.
    assert_eq!(h.svc.confirm_spam_report(NUMBER).await.unwrap(), 0);

    h.spam_reports
        .add_report(SpamReport {
            phone_number: NUMBER.to_string(),
            reported_at: Utc::now(),
            verified: true,
            confirmations: 0,
            status: ReportStatus::Pending,
        })
        .await
        .unwrap();

    for expected in 1..=3u32 {
        let n = h.svc.confirm_spam_report(NUMBER).await.unwrap();
        assert_eq!(n, expected);
    }

    let rec = h
        .phone_numbers
        .find_by_number(NUMBER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.entry, Some(ListEntry::Blacklist));
}
