use chrono::Duration;
use futures::future::join_all;
use pasta_core::models::{ExpiryRequest, ListQuery};
use pasta_core::{AppError, Clock};
use pasta_db::ShortlinkRepository;
use pasta_services::test_helpers::TestHarness;
use pasta_services::{CreateShortlinkRequest, Resolved};

fn request(url: &str) -> CreateShortlinkRequest {
    CreateShortlinkRequest {
        url: url.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_without_capability_is_forbidden_for_any_url() {
    let h = TestHarness::new();
    let key = h.verified_key("plain@example.com", false).await;

    for url in ["https://example.com", "not a url", "ftp://example.com", ""] {
        let err = h
            .services
            .shortlinks
            .create(&key, request(url))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)), "{url:?}");
    }
    assert_eq!(h.shortlinks.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_rejects_bad_urls_before_persisting() {
    let h = TestHarness::new();
    let key = h.verified_key("links@example.com", true).await;

    for url in ["not a url", "ftp://example.com/file", "javascript:alert(1)", "/relative"] {
        let err = h
            .services
            .shortlinks
            .create(&key, request(url))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)), "{url:?}");
    }
    assert_eq!(h.shortlinks.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_and_expiry() {
    let h = TestHarness::new();
    let key = h.verified_key("links@example.com", true).await;

    let forever = h
        .services
        .shortlinks
        .create(
            &key,
            CreateShortlinkRequest {
                url: "https://example.com/docs".to_string(),
                title: Some("  Docs  ".to_string()),
                expires_in: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(forever.expires_at, None);
    assert_eq!(forever.title.as_deref(), Some("Docs"));
    assert_eq!(forever.clicks, 0);
    assert_eq!(forever.owner_key, key.key);

    let brief = h
        .services
        .shortlinks
        .create(
            &key,
            CreateShortlinkRequest {
                url: "https://example.com/brief".to_string(),
                title: None,
                expires_in: Some("1h".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(brief.expires_at, Some(h.clock.now() + Duration::hours(1)));

    let err = h
        .services
        .shortlinks
        .create(
            &key,
            CreateShortlinkRequest {
                url: "https://example.com".to_string(),
                title: None,
                expires_in: Some("eventually".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidDuration(_)));

    h.clock.advance(Duration::hours(2));
    assert!(matches!(
        h.services.shortlinks.get(&brief.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(h.services.shortlinks.get(&forever.id).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_clicks_are_all_counted() {
    let h = TestHarness::new();
    let key = h.verified_key("links@example.com", true).await;
    let link = h
        .services
        .shortlinks
        .create(&key, request("https://example.com"))
        .await
        .unwrap();

    let clicks = (0..50).map(|_| h.services.shortlinks.record_click(&link.id));
    join_all(clicks).await;

    let handles: Vec<_> = (0..10)
        .map(|_| h.services.shortlinks.spawn_click(link.id.clone()))
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = h.services.shortlinks.stats(&link.id, &key).await.unwrap();
    assert_eq!(stats.clicks, 60);
    assert_eq!(stats.last_click, Some(h.clock.now()));
}

#[tokio::test]
async fn test_clicks_on_expired_link_are_not_counted() {
    let h = TestHarness::new();
    let key = h.verified_key("links@example.com", true).await;
    let link = h
        .services
        .shortlinks
        .create(
            &key,
            CreateShortlinkRequest {
                url: "https://example.com".to_string(),
                title: None,
                expires_in: Some("1m".to_string()),
            },
        )
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(2));

    h.services.shortlinks.record_click(&link.id).await;

    // Read the row directly; the service already hides expired links.
    let row = h.shortlinks.get(&link.id).await.unwrap().unwrap();
    assert_eq!(row.clicks, 0);
    assert_eq!(row.last_click, None);
}

#[tokio::test]
async fn test_click_tracking_failure_is_swallowed() {
    let h = TestHarness::new();
    let key = h.verified_key("links@example.com", true).await;
    let link = h
        .services
        .shortlinks
        .create(&key, request("https://example.com"))
        .await
        .unwrap();
    h.shortlinks.fail_clicks(true);

    h.services.shortlinks.record_click(&link.id).await;
    h.services
        .shortlinks
        .spawn_click(link.id.clone())
        .await
        .unwrap();

    match h.services.resolver.resolve_and_track(&link.id).await.unwrap() {
        Resolved::Redirect(found) => assert_eq!(found.target_url, "https://example.com/"),
        other => panic!("expected redirect, got {other:?}"),
    }
    let stats = h.services.shortlinks.stats(&link.id, &key).await.unwrap();
    assert_eq!(stats.clicks, 0);
}

#[tokio::test]
async fn test_stats_are_owner_only() {
    let h = TestHarness::new();
    let owner = h.verified_key("owner@example.com", true).await;
    let other = h.verified_key("other@example.com", true).await;
    let link = h
        .services
        .shortlinks
        .create(&owner, request("https://example.com"))
        .await
        .unwrap();

    let err = h.services.shortlinks.stats(&link.id, &other).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = h.services.shortlinks.stats("missing1", &owner).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_manage_own_shortlinks() {
    let h = TestHarness::new();
    let owner = h.verified_key("owner@example.com", true).await;
    let other = h.verified_key("other@example.com", true).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let link = h
            .services
            .shortlinks
            .create(&owner, request(&format!("https://example.com/{i}")))
            .await
            .unwrap();
        ids.push(link.id);
        h.clock.advance(Duration::seconds(1));
    }
    h.services
        .shortlinks
        .create(&other, request("https://example.org"))
        .await
        .unwrap();

    let page = h
        .services
        .shortlinks
        .list(&owner, &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items[0].id, ids[2]);

    let err = h
        .services
        .shortlinks
        .list(
            &owner,
            &ListQuery {
                sort: Some("size desc".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let updated = h
        .services
        .shortlinks
        .update_expiry(&ids[0], &owner, ExpiryRequest::Duration("1d".to_string()))
        .await
        .unwrap();
    assert_eq!(updated.expires_at, Some(h.clock.now() + Duration::days(1)));

    let err = h
        .services
        .shortlinks
        .delete(&ids[1], &other)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    h.services.shortlinks.delete(&ids[1], &owner).await.unwrap();
    assert!(matches!(
        h.services.shortlinks.get(&ids[1]).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_resolver_prefers_shortlinks_then_pastes() {
    let h = TestHarness::new();
    let key = h.verified_key("links@example.com", true).await;
    let link = h
        .services
        .shortlinks
        .create(&key, request("https://example.com/target"))
        .await
        .unwrap();
    let paste = h.upload(TestHarness::text("hello"), None).await.unwrap();

    assert!(matches!(
        h.services.resolver.resolve(&link.id).await.unwrap(),
        Resolved::Redirect(l) if l.id == link.id
    ));
    assert!(matches!(
        h.services.resolver.resolve(&paste.id).await.unwrap(),
        Resolved::Paste(p) if p.id == paste.id
    ));
    assert!(matches!(
        h.services.resolver.resolve("nothing1").await,
        Err(AppError::NotFound(_))
    ));
}
