//! Thin HTTP adapter over the screening core. No decision logic lives here:
//! handlers validate input, enforce the verification rate limit by
//! inspecting the attempt count, and translate the two typed errors into
//! status codes. Everything else is a straight pass-through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::aggregate::{FeatureAggregator, SignalSources};
use crate::config::ScreeningConfig;
use crate::error::ScreenError;
use crate::phone;
use crate::reputation::{ReputationDetails, ReputationService};
use crate::screening::{ScreeningResult, ScreeningService};
use crate::signals::sim::{SimCarrierLookup, SimDncRegistry, SimSpamDatabase};
use crate::stores::memory::{
    MemoryCallLogStore, MemoryPhoneNumberStore, MemorySpamReportStore,
    MemoryVerificationCodeStore,
};
use crate::stores::{CallLogStore, PhoneNumberStore, SpamReportStore, VerificationCodeStore};
use crate::verification::VerificationService;

#[derive(Clone)]
pub struct AppState {
    pub screening: ScreeningService,
    pub reputation: ReputationService,
    pub verification: Arc<VerificationService>,
    pub max_verification_attempts: u32,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/screen", post(screen))
        .route("/screen/batch", post(screen_batch))
        .route("/reputation", get(reputation_get))
        .route("/reputation/recalculate", post(reputation_recalculate))
        .route("/reputation/batch", post(reputation_batch))
        .route("/reports/confirm", post(confirm_report))
        .route("/verify/request", post(verify_request))
        .route("/verify/check", post(verify_check))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Full in-memory wiring (memory stores + simulated signal sources): the
/// dev/simulated environment and the integration-test entrypoint.
pub fn memory_state(cfg: &ScreeningConfig) -> AppState {
    let phone_numbers: Arc<dyn PhoneNumberStore> = Arc::new(MemoryPhoneNumberStore::new());
    let call_logs: Arc<dyn CallLogStore> = Arc::new(MemoryCallLogStore::new());
    let spam_reports: Arc<dyn SpamReportStore> = Arc::new(MemorySpamReportStore::new());
    let codes: Arc<dyn VerificationCodeStore> = Arc::new(MemoryVerificationCodeStore::new());

    let carrier = Arc::new(SimCarrierLookup::new());
    let spam_db = Arc::new(SimSpamDatabase::new());
    let dnc = Arc::new(SimDncRegistry::new());

    let reputation = ReputationService::new(
        cfg,
        Arc::clone(&phone_numbers),
        Arc::clone(&call_logs),
        Arc::clone(&spam_reports),
        carrier.clone(),
        None,
    );

    let aggregator = FeatureAggregator::new(
        SignalSources {
            carrier,
            spam_db,
            dnc,
            voice: None,
            scam_phrases: None,
            ml: None,
        },
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
        cfg,
        aggregator,
        Arc::clone(&verification),
        call_logs,
        spam_reports,
        phone_numbers,
        reputation.clone(),
    );

    AppState {
        screening,
        reputation,
        verification,
        max_verification_attempts: cfg.max_verification_attempts,
    }
}

type ApiError = (StatusCode, String);

fn map_err(err: ScreenError) -> ApiError {
    match err {
        ScreenError::InvalidNumber(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        ScreenError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[derive(Deserialize)]
struct NumberReq {
    phone_number: String,
}

#[derive(Deserialize)]
struct NumberQuery {
    number: String,
}

#[derive(Deserialize)]
struct BatchReq {
    phone_numbers: Vec<String>,
}

#[derive(Deserialize)]
struct VerifyReq {
    phone_number: String,
    code: String,
}

async fn screen(
    State(state): State<AppState>,
    Json(body): Json<NumberReq>,
) -> Result<Json<ScreeningResult>, ApiError> {
    let result = state
        .screening
        .screen_call(&body.phone_number, None)
        .await
        .map_err(map_err)?;
    Ok(Json(result))
}

async fn screen_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchReq>,
) -> Json<HashMap<String, ScreeningResult>> {
    Json(state.screening.batch_screen(&body.phone_numbers).await)
}

async fn reputation_get(
    State(state): State<AppState>,
    Query(query): Query<NumberQuery>,
) -> Result<Json<ReputationDetails>, ApiError> {
    let number = phone::canonicalize(&query.number).map_err(map_err)?;
    Ok(Json(state.reputation.reputation_for(&number).await))
}

async fn reputation_recalculate(
    State(state): State<AppState>,
    Json(body): Json<NumberReq>,
) -> Result<Json<ReputationDetails>, ApiError> {
    let number = phone::canonicalize(&body.phone_number).map_err(map_err)?;
    let details = state
        .reputation
        .force_recalculate(&number)
        .await
        .map_err(internal)?;
    Ok(Json(details))
}

#[derive(Serialize)]
struct BatchUpdateResp {
    recomputed: usize,
}

async fn reputation_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchReq>,
) -> Result<Json<BatchUpdateResp>, ApiError> {
    let mut numbers = Vec::with_capacity(body.phone_numbers.len());
    for raw in &body.phone_numbers {
        numbers.push(phone::canonicalize(raw).map_err(map_err)?);
    }
    let recomputed = state.reputation.batch_update(&numbers).await;
    Ok(Json(BatchUpdateResp { recomputed }))
}

#[derive(Serialize)]
struct ConfirmResp {
    confirmations: u32,
}

async fn confirm_report(
    State(state): State<AppState>,
    Json(body): Json<NumberReq>,
) -> Result<Json<ConfirmResp>, ApiError> {
    let confirmations = state
        .screening
        .confirm_spam_report(&body.phone_number)
        .await
        .map_err(map_err)?;
    Ok(Json(ConfirmResp { confirmations }))
}

#[derive(Serialize)]
struct CodeResp {
    code: String,
    expires_at: DateTime<Utc>,
    message: String,
}

async fn verify_request(
    State(state): State<AppState>,
    Json(body): Json<NumberReq>,
) -> Result<Json<CodeResp>, ApiError> {
    let number = phone::canonicalize(&body.phone_number).map_err(map_err)?;
    let code = state
        .verification
        .generate_code(&number)
        .await
        .map_err(internal)?;
    Ok(Json(CodeResp {
        code: code.code,
        expires_at: code.expires_at,
        message: "Code expires in 15 minutes.".to_string(),
    }))
}

#[derive(Serialize)]
struct VerifyResp {
    verified: bool,
}

async fn verify_check(
    State(state): State<AppState>,
    Json(body): Json<VerifyReq>,
) -> Result<Json<VerifyResp>, ApiError> {
    let number = phone::canonicalize(&body.phone_number).map_err(map_err)?;

    // Rate limiting lives here, one layer above the core: inspect the
    // trailing-24h attempt count before invoking verification.
    let attempts = state
        .verification
        .attempts_last_day(&number)
        .await
        .map_err(internal)?;
    if attempts > state.max_verification_attempts {
        return Err(map_err(ScreenError::RateLimited { attempts }));
    }

    let verified = state
        .verification
        .verify_code(&number, &body.code)
        .await
        .map_err(internal)?;
    Ok(Json(VerifyResp { verified }))
}
