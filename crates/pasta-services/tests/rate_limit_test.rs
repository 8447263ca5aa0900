use chrono::Duration;
use pasta_core::{AppError, ServiceConfig};
use pasta_services::test_helpers::TestHarness;

#[tokio::test]
async fn test_rate_limited_create_has_no_side_effects() {
    let h = TestHarness::with_config(ServiceConfig {
        rate_limit_per_window: 2,
        ..ServiceConfig::default()
    });
    let owner = h.verified_key("owner@example.com", false).await;

    for _ in 0..2 {
        h.upload(TestHarness::text("ok"), Some(&owner)).await.unwrap();
    }
    let err = h
        .upload(TestHarness::text("too many"), Some(&owner))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateLimited { .. }));
    assert_eq!(h.memory.object_count(), 2);

    // Anonymous uploads are not key-scoped.
    h.upload(TestHarness::text("anon"), None).await.unwrap();

    h.clock.advance(Duration::minutes(2));
    h.upload(TestHarness::text("later"), Some(&owner)).await.unwrap();
}
