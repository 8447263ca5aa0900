use pasta_core::AppError;
use pasta_db::PasteRepository;
use pasta_services::test_helpers::TestHarness;
use pasta_services::{CreateShortlinkRequest, DeleteAuth, UploadEnvelope};

#[tokio::test]
async fn test_failed_insert_releases_stored_content() {
    let h = TestHarness::new();
    h.pastes.fail_inserts(true);

    let err = h.upload(TestHarness::text("orphan?"), None).await.unwrap_err();

    match err {
        AppError::Persistence(msg) => assert!(!msg.contains("Orphaned"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.memory.object_count(), 0);
    assert_eq!(h.storage.delete_count(), 1);
}

#[tokio::test]
async fn test_failed_compensation_escalates_to_persistence_error() {
    let h = TestHarness::new();
    h.pastes.fail_inserts(true);
    h.storage.fail_deletes(true);

    let err = h.upload(TestHarness::text("stuck"), None).await.unwrap_err();

    match err {
        AppError::Persistence(msg) => assert!(msg.contains("Orphaned"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.memory.object_count(), 1);
}

#[tokio::test]
async fn test_storage_put_failure_creates_no_metadata() {
    let h = TestHarness::new();
    h.storage.fail_puts(true);

    let err = h.upload(TestHarness::text("data"), None).await.unwrap_err();

    assert!(matches!(err, AppError::StorageUnavailable(_)));
    assert_eq!(h.pastes.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_id_collision_is_resolved_internally() {
    let h = TestHarness::new();
    h.ids.push(&["aaaa1111"]);
    let first = h.upload(TestHarness::text("first"), None).await.unwrap();
    assert_eq!(first.id, "aaaa1111");

    h.ids.push(&["aaaa1111", "aaaa1111", "bbbb2222"]);
    let second = h.upload(TestHarness::text("second"), None).await.unwrap();
    assert_eq!(second.id, "bbbb2222");

    let (_, bytes) = h.services.pastes.read("aaaa1111").await.unwrap();
    assert_eq!(&bytes[..], b"first");
}

#[tokio::test]
async fn test_ids_are_unique_across_pastes_and_shortlinks() {
    let h = TestHarness::new();
    let owner = h.verified_key("owner@example.com", true).await;
    h.ids.push(&["shared01"]);
    let link = h
        .services
        .shortlinks
        .create(
            &owner,
            CreateShortlinkRequest {
                url: "https://example.com".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(link.id, "shared01");

    h.ids.push(&["shared01", "paste001"]);
    let paste = h.upload(TestHarness::text("body"), None).await.unwrap();
    assert_eq!(paste.id, "paste001");
}

#[tokio::test]
async fn test_concurrent_insert_conflict_is_retried() {
    let h = TestHarness::new();
    h.pastes.conflict_next_inserts(3);

    let paste = h.upload(TestHarness::text("retry"), None).await.unwrap();

    assert!(h.services.pastes.get(&paste.id).await.is_ok());
    assert_eq!(h.memory.object_count(), 1);
}

#[tokio::test]
async fn test_exhausted_id_retries_surface_conflict_without_orphans() {
    let h = TestHarness::new();
    h.pastes.conflict_next_inserts(100);

    let err = h.upload(TestHarness::text("no room"), None).await.unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.memory.object_count(), 0);
    assert_eq!(h.pastes.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_storage_delete_failure_keeps_metadata() {
    let h = TestHarness::new();
    let paste = h.upload(TestHarness::text("sticky"), None).await.unwrap();
    h.storage.fail_deletes(true);

    let err = h
        .services
        .pastes
        .delete(&paste.id, DeleteAuth::DeleteKey(&paste.delete_key))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StorageUnavailable(_)));
    let (_, bytes) = h.services.pastes.read(&paste.id).await.unwrap();
    assert_eq!(&bytes[..], b"sticky");

    h.storage.fail_deletes(false);
    h.services
        .pastes
        .delete(&paste.id, DeleteAuth::DeleteKey(&paste.delete_key))
        .await
        .unwrap();
    assert!(h.pastes.get(&paste.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_can_be_retried_after_metadata_failure() {
    let h = TestHarness::new();
    let paste = h.upload(TestHarness::text("twice"), None).await.unwrap();
    h.pastes.fail_deletes(true);

    let err = h
        .services
        .pastes
        .delete(&paste.id, DeleteAuth::DeleteKey(&paste.delete_key))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));
    assert!(!h.memory.contains(&paste.location));

    // The storage object is already gone; a retry only removes the row.
    h.pastes.fail_deletes(false);
    h.services
        .pastes
        .delete(&paste.id, DeleteAuth::DeleteKey(&paste.delete_key))
        .await
        .unwrap();
    assert!(h.pastes.get(&paste.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_failures_are_distinct_and_leave_nothing_behind() {
    let h = TestHarness::new();
    let url = "https://example.com/file.txt";
    let cases = [
        AppError::FetchFailed("connection reset".to_string()),
        AppError::FetchStatus { status: 502 },
        AppError::PayloadTooLarge("too big".to_string()),
    ];

    for error in cases {
        let expected = error.to_string();
        h.fetcher.add_error(url, error);
        let envelope = UploadEnvelope::JsonUrl {
            url: url.to_string(),
            options: Default::default(),
        };
        let err = h.upload(envelope, None).await.unwrap_err();
        assert_eq!(err.to_string(), expected);
    }
    assert_eq!(h.memory.object_count(), 0);
}
