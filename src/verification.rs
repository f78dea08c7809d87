//! # Verification
//! Challenge-path plumbing: issue a short-lived 6-digit code when a call is
//! blocked or challenged, consume it exactly once, and promote the number to
//! the whitelist on success — a caller who passes the challenge is trusted
//! going forward.
//!
//! Rate limiting is enforced one layer above the core: callers inspect
//! `attempts_last_day` before invoking `verify_code`.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use metrics::counter;
use rand::Rng;
use tracing::info;

use crate::phone;
use crate::stores::{ListEntry, PhoneNumberStore, VerificationCode, VerificationCodeStore};

pub struct VerificationService {
    codes: Arc<dyn VerificationCodeStore>,
    phone_numbers: Arc<dyn PhoneNumberStore>,
    ttl: Duration,
}

impl VerificationService {
    pub fn new(
        codes: Arc<dyn VerificationCodeStore>,
        phone_numbers: Arc<dyn PhoneNumberStore>,
        ttl_mins: i64,
    ) -> Self {
        Self {
            codes,
            phone_numbers,
            ttl: Duration::minutes(ttl_mins),
        }
    }

    /// Issue and store a fresh code for the number.
    pub async fn generate_code(&self, number: &str) -> Result<VerificationCode> {
        let number = phone::canonicalize(number)?;
        let now = Utc::now();
        let code = VerificationCode {
            phone_number: number.clone(),
            code: random_code(),
            issued_at: now,
            expires_at: now + self.ttl,
            used: false,
            attempts: 0,
        };
        self.codes.insert(code.clone()).await?;
        counter!("verification_codes_issued_total").increment(1);
        Ok(code)
    }

    /// Consume a `(number, code)` pair. Succeeds only against a matching,
    /// unused, unexpired code; success whitelists the number.
    pub async fn verify_code(&self, number: &str, code: &str) -> Result<bool> {
        let number = phone::canonicalize(number)?;
        let now = Utc::now();
        self.codes.record_attempt(&number, now).await?;

        if !self.codes.consume(&number, code, now).await? {
            counter!("verification_failures_total").increment(1);
            return Ok(false);
        }

        self.phone_numbers
            .set_entry(&number, ListEntry::Whitelist)
            .await?;
        counter!("verification_successes_total").increment(1);
        info!(target: "verification", number = %number, "caller verified, promoted to whitelist");
        Ok(true)
    }

    /// Verification attempts against this number in the trailing 24 hours.
    /// The layer above inspects this count to reject further attempts.
    pub async fn attempts_last_day(&self, number: &str) -> Result<u32> {
        let number = phone::canonicalize(number)?;
        let since = Utc::now() - Duration::hours(24);
        self.codes.attempts_since(&number, since).await
    }
}

/// Six numeric digits from the thread-local CSPRNG, zero-padded.
fn random_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}
