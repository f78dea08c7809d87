// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod phone;
pub mod reputation;
pub mod risk;
pub mod screening;
pub mod signals;
pub mod stores;
pub mod verification;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, memory_state, AppState};
pub use crate::config::ScreeningConfig;
pub use crate::error::ScreenError;
pub use crate::features::CallFeatures;
pub use crate::reputation::{ReputationDetails, ReputationService, ReputationTrend};
pub use crate::risk::{calculate_risk, DecisionOrigin, RiskScore, ScreenAction};
pub use crate::screening::{ScreeningResult, ScreeningService};
pub use crate::verification::VerificationService;

/// Router wired entirely in memory (simulated signals, memory stores) —
/// what integration tests and the local dev loop boot against.
pub fn app() -> axum::Router {
    let cfg = ScreeningConfig::default();
    api::create_router(api::memory_state(&cfg))
}
