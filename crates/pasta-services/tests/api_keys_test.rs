use chrono::Duration;
use pasta_core::{AppError, ServiceConfig, SystemClock};
use pasta_db::{ApiKeyRepository, MemoryApiKeyRepository};
use pasta_infra::RateLimiter;
use pasta_services::test_helpers::TestHarness;
use pasta_services::{ApiKeyService, KeyRequest, RandomIdGenerator};
use std::sync::Arc;

fn key_request(email: &str) -> KeyRequest {
    KeyRequest {
        email: email.to_string(),
        name: "Ada".to_string(),
    }
}

#[tokio::test]
async fn test_request_and_verify_key() {
    let h = TestHarness::new();

    let pending = h
        .services
        .api_keys
        .request_key(key_request("ada@example.com"), "203.0.113.7")
        .await
        .unwrap();
    assert!(!pending.verified);
    assert!(!pending.allow_shortlinks);
    assert_eq!(pending.key.len(), 32);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email, "ada@example.com");
    assert!(sent[0]
        .verify_url
        .starts_with("http://localhost:3000/verify/"));
    let token = sent[0].token().to_string();
    assert_eq!(token.len(), 64);

    // Unverified keys cannot mutate anything.
    let err = h
        .upload(TestHarness::text("early"), Some(&pending))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let verified = h.services.api_keys.verify(&token).await.unwrap();
    assert!(verified.verified);
    assert_eq!(verified.key, pending.key);
    assert_eq!(verified.verify_token, None);

    // Tokens are single use.
    let err = h.services.api_keys.verify(&token).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let caller = h.services.api_keys.resolve(&pending.key).await.unwrap();
    assert!(h.upload(TestHarness::text("now"), Some(&caller)).await.is_ok());
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let h = TestHarness::new();
    h.services
        .api_keys
        .request_key(key_request("late@example.com"), "203.0.113.7")
        .await
        .unwrap();
    let token = h.notifier.sent()[0].token().to_string();

    h.clock.advance(Duration::hours(25));

    let err = h.services.api_keys.verify(&token).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_notifier_failure_rolls_back_key() {
    let h = TestHarness::new();
    h.notifier.fail_sends(true);

    let err = h
        .services
        .api_keys
        .request_key(key_request("bounce@example.com"), "203.0.113.7")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ServiceUnavailable(_)));
    assert!(h.api_keys.is_empty());
}

#[tokio::test]
async fn test_verified_email_cannot_request_again() {
    let h = TestHarness::new();
    h.verified_key("taken@example.com", false).await;

    let err = h
        .services
        .api_keys
        .request_key(key_request("taken@example.com"), "203.0.113.7")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_invalid_request_fields() {
    let h = TestHarness::new();
    for request in [
        key_request("not-an-email"),
        KeyRequest {
            email: "ok@example.com".to_string(),
            name: "   ".to_string(),
        },
    ] {
        let err = h
            .services
            .api_keys
            .request_key(request, "203.0.113.7")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
    assert!(h.api_keys.is_empty());
}

#[tokio::test]
async fn test_key_requests_are_rate_limited_per_ip() {
    let h = TestHarness::with_config(ServiceConfig {
        key_request_limit_per_window: 2,
        ..ServiceConfig::default()
    });

    for i in 0..2 {
        h.services
            .api_keys
            .request_key(key_request(&format!("user{i}@example.com")), "198.51.100.1")
            .await
            .unwrap();
    }
    let err = h
        .services
        .api_keys
        .request_key(key_request("user9@example.com"), "198.51.100.1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateLimited { .. }));

    h.services
        .api_keys
        .request_key(key_request("user9@example.com"), "198.51.100.2")
        .await
        .unwrap();
    assert_eq!(h.api_keys.len(), 3);
}

#[tokio::test]
async fn test_requests_fail_without_notifier() {
    let repository = Arc::new(MemoryApiKeyRepository::new());
    let clock = SystemClock::shared();
    let service = ApiKeyService::new(
        repository.clone(),
        None,
        Arc::new(RateLimiter::new("api_key_request", 3, 3600, clock.clone())),
        Arc::new(RandomIdGenerator::default()),
        clock,
        "http://localhost:3000",
    );

    let err = service
        .request_key(key_request("ada@example.com"), "203.0.113.7")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ServiceUnavailable(_)));
    assert!(repository.is_empty());
}

#[tokio::test]
async fn test_unknown_key_is_unauthorized_and_access_can_be_granted() {
    let h = TestHarness::new();
    let err = h.services.api_keys.resolve("nope").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let key = h.verified_key("grant@example.com", false).await;
    h.services
        .api_keys
        .set_shortlink_access(&key.key, true)
        .await
        .unwrap();
    assert!(h.api_keys.get(&key.key).await.unwrap().unwrap().allow_shortlinks);

    let err = h
        .services
        .api_keys
        .set_shortlink_access("missing", true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
