// tests/verification.rs
//
// Challenge-path semantics: code shape, 15-minute expiry, exactly-once
// consumption, whitelist promotion, attempt counting.

use std::sync::Arc;

use chrono::{Duration, Utc};

use call_sentinel::stores::memory::{MemoryPhoneNumberStore, MemoryVerificationCodeStore};
use call_sentinel::stores::{ListEntry, PhoneNumberStore, VerificationCode, VerificationCodeStore};
use call_sentinel::verification::VerificationService;

const NUMBER: &str = "+15550100199";

struct Harness {
    codes: Arc<MemoryVerificationCodeStore>,
    phone_numbers: Arc<MemoryPhoneNumberStore>,
    svc: VerificationService,
}

fn harness() -> Harness {
    let codes = Arc::new(MemoryVerificationCodeStore::new());
    let phone_numbers = Arc::new(MemoryPhoneNumberStore::new());
    let svc = VerificationService::new(codes.clone(), phone_numbers.clone(), 15);
    Harness {
        codes,
        phone_numbers,
        svc,
    }
}

#[tokio::test]
async fn issued_code_is_six_digits_and_expires_in_fifteen_minutes() {
    let h = harness();
    let code = h.svc.generate_code(NUMBER).await.unwrap();
    assert_eq!(code.code.len(), 6);
    assert!(code.code.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(code.expires_at, code.issued_at + Duration::minutes(15));
    assert!(!code.used);
}

#[tokio::test]
async fn successful_verification_promotes_to_whitelist() {
    let h = harness();
    let code = h.svc.generate_code(NUMBER).await.unwrap();

    assert!(h.svc.verify_code(NUMBER, &code.code).await.unwrap());

    let rec = h
        .phone_numbers
        .find_by_number(NUMBER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.entry, Some(ListEntry::Whitelist));
}

#[tokio::test]
async fn a_code_is_consumed_exactly_once() {
    let h = harness();
    let code = h.svc.generate_code(NUMBER).await.unwrap();

    assert!(h.svc.verify_code(NUMBER, &code.code).await.unwrap());
    // Same code again: invalid or expired.
    assert!(!h.svc.verify_code(NUMBER, &code.code).await.unwrap());
}

#[tokio::test]
async fn wrong_code_does_not_verify() {
    let h = harness();
    let code = h.svc.generate_code(NUMBER).await.unwrap();
    let wrong = if code.code == "000000" { "000001" } else { "000000" };
    assert!(!h.svc.verify_code(NUMBER, wrong).await.unwrap());
    assert!(h
        .phone_numbers
        .find_by_number(NUMBER)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn expired_code_is_rejected() {
    let h = harness();
    // Plant an already-expired code directly.
    h.codes
        .insert(VerificationCode {
            phone_number: NUMBER.to_string(),
            code: "123456".to_string(),
            issued_at: Utc::now() - Duration::minutes(30),
            expires_at: Utc::now() - Duration::minutes(15),
            used: false,
            attempts: 0,
        })
        .await
        .unwrap();
    assert!(!h.svc.verify_code(NUMBER, "123456").await.unwrap());
}

#[tokio::test]
async fn attempts_are_counted_over_the_trailing_day() {
    let h = harness();
    let code = h.svc.generate_code(NUMBER).await.unwrap();

    assert_eq!(h.svc.attempts_last_day(NUMBER).await.unwrap(), 0);
    for _ in 0..3 {
        let _ = h.svc.verify_code(NUMBER, "999999").await.unwrap();
    }
    let _ = h.svc.verify_code(NUMBER, &code.code).await.unwrap();
    assert_eq!(h.svc.attempts_last_day(NUMBER).await.unwrap(), 4);
}

#[tokio::test]
async fn malformed_numbers_are_rejected_before_any_store_touch() {
    let h = harness();
    assert!(h.svc.generate_code("garbage").await.is_err());
    assert!(h.svc.verify_code("garbage", "123456").await.is_err());
}
