//! Phone number normalization and validation.
//!
//! Numbers arrive from carriers, web forms and hardware drivers in wildly
//! different shapes ("+1 (555) 010-0199", "555.010.0199", "00155501001 99").
//! Everything downstream keys on the normalized form, so this is the single
//! place where hygiene happens. Validation rejects anything that cannot be a
//! dialable number before screening even starts.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ScreenError;

/// Digits with an optional leading `+`, 7..=15 digits total (E.164 bounds).
static VALID_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("valid number regex"));

/// Strip separators and visual noise, keeping digits and a leading `+`.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, ch) in trimmed.chars().enumerate() {
        if ch == '+' && i == 0 {
            out.push('+');
        } else if ch.is_ascii_digit() {
            out.push(ch);
        }
        // everything else (spaces, dashes, dots, parens) is separator noise
    }
    out
}

/// Normalize and validate in one step. Returns the canonical form used as
/// the storage key everywhere, or `ScreenError::InvalidNumber`.
pub fn canonicalize(raw: &str) -> Result<String, ScreenError> {
    let n = normalize(raw);
    if VALID_NUMBER.is_match(&n) {
        Ok(n)
    } else {
        Err(ScreenError::InvalidNumber(raw.trim().to_string()))
    }
}
