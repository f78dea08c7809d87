//! Errors that may surface to callers of the screening core.
//!
//! Screening itself never fails outward (worst case it fails open); only the
//! explicit user actions — validation of an inbound number and the
//! verification rate limit — carry typed errors the HTTP layer maps to
//! status codes. Everything internal stays on `anyhow`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenError {
    /// Missing or malformed phone number, rejected before aggregation.
    InvalidNumber(String),
    /// More than the allowed verification attempts in the trailing 24 hours.
    RateLimited { attempts: u32 },
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenError::InvalidNumber(raw) => {
                write!(f, "invalid phone number: {raw:?}")
            }
            ScreenError::RateLimited { attempts } => {
                write!(f, "too many verification attempts ({attempts} in 24h)")
            }
        }
    }
}

impl std::error::Error for ScreenError {}
