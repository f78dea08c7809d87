//! Call Sentinel — Binary Entrypoint
//! Boots the Axum HTTP server, wiring stores, signal sources, the screening
//! core and middleware.
//!
//! Signal sources are chosen from the environment: when the upstream URLs
//! (`CARRIER_API_URL`, `SPAM_DB_API_URL`, `DNC_API_URL`) are present the
//! live reqwest clients are used, otherwise the simulated sources keep the
//! service fully functional for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use call_sentinel::aggregate::{FeatureAggregator, SignalSources};
use call_sentinel::api::{create_router, AppState};
use call_sentinel::config::ScreeningConfig;
use call_sentinel::metrics::Metrics;
use call_sentinel::reputation::ReputationService;
use call_sentinel::screening::ScreeningService;
use call_sentinel::signals::http::{HttpCarrierLookup, HttpDncRegistry, HttpSpamDatabase};
use call_sentinel::signals::sim::{SimCarrierLookup, SimDncRegistry, SimSpamDatabase};
use call_sentinel::signals::{CarrierLookup, DncCheck, SpamDatabaseCheck};
use call_sentinel::stores::memory::{
    MemoryCallLogStore, MemoryPhoneNumberStore, MemorySpamReportStore,
    MemoryVerificationCodeStore,
};
use call_sentinel::stores::{CallLogStore, PhoneNumberStore, SpamReportStore, VerificationCodeStore};
use call_sentinel::verification::VerificationService;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("call_sentinel=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn signal_sources(cfg: &ScreeningConfig) -> anyhow::Result<SignalSources> {
    let timeout = Duration::from_millis(cfg.signal_timeout_ms);

    let carrier: Arc<dyn CarrierLookup> = match std::env::var("CARRIER_API_URL") {
        Ok(url) => Arc::new(HttpCarrierLookup::new(url, timeout)?),
        Err(_) => Arc::new(SimCarrierLookup::new()),
    };
    let spam_db: Arc<dyn SpamDatabaseCheck> = match std::env::var("SPAM_DB_API_URL") {
        Ok(url) => Arc::new(HttpSpamDatabase::new(url, timeout)?),
        Err(_) => Arc::new(SimSpamDatabase::new()),
    };
    let dnc: Arc<dyn DncCheck> = match std::env::var("DNC_API_URL") {
        Ok(url) => Arc::new(HttpDncRegistry::new(url, timeout)?),
        Err(_) => Arc::new(SimDncRegistry::new()),
    };

    Ok(SignalSources {
        carrier,
        spam_db,
        dnc,
        voice: None,
        scam_phrases: None,
        ml: None,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config_path =
        std::env::var("CALL_SENTINEL_CONFIG").unwrap_or_else(|_| "screening.json".to_string());
    let cfg = ScreeningConfig::load_from_file(&config_path);

    let metrics = Metrics::init(&cfg);

    // In-process stores; production deployments swap in database-backed
    // implementations of the same traits.
    let phone_numbers: Arc<dyn PhoneNumberStore> = Arc::new(MemoryPhoneNumberStore::new());
    let call_logs: Arc<dyn CallLogStore> = Arc::new(MemoryCallLogStore::new());
    let spam_reports: Arc<dyn SpamReportStore> = Arc::new(MemorySpamReportStore::new());
    let codes: Arc<dyn VerificationCodeStore> = Arc::new(MemoryVerificationCodeStore::new());

    let sources = signal_sources(&cfg)?;
    let carrier = Arc::clone(&sources.carrier);

    let journal: PathBuf = std::env::var("REPUTATION_JOURNAL")
        .unwrap_or_else(|_| "reputation-journal.jsonl".to_string())
        .into();

    let reputation = ReputationService::new(
        &cfg,
        Arc::clone(&phone_numbers),
        Arc::clone(&call_logs),
        Arc::clone(&spam_reports),
        carrier,
        Some(journal),
    );
    // Pick up recomputes journaled by a previous process.
    reputation.recover();

    let aggregator = FeatureAggregator::new(
        sources,
        Arc::clone(&phone_numbers),
        Arc::clone(&call_logs),
        Arc::clone(&spam_reports),
        reputation.clone(),
        Duration::from_millis(cfg.signal_timeout_ms),
        cfg.development_mode,
    );

    let verification = Arc::new(VerificationService::new(
        codes,
        Arc::clone(&phone_numbers),
        cfg.verification_ttl_mins,
    ));

    let screening = ScreeningService::new(
        &cfg,
        aggregator,
        Arc::clone(&verification),
        Arc::clone(&call_logs),
        Arc::clone(&spam_reports),
        Arc::clone(&phone_numbers),
        reputation.clone(),
    );

    let state = AppState {
        screening,
        reputation,
        verification,
        max_verification_attempts: cfg.max_verification_attempts,
    };

    let app = create_router(state).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "call-sentinel listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
