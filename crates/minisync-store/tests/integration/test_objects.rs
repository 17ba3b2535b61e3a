//! Object-level calls: put, delete, stat.

use chrono::{TimeZone, Utc};
use minisync_core::ports::{IObjectStoreClient, StoreError};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_put_uploads_with_mtime_metadata() {
    let (server, store) = common::setup_s3_mock().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("todo.txt");
    std::fs::write(&file, b"0123456789").unwrap();

    Mock::given(method("PUT"))
        .and(path("/test-bucket/notes/todo.txt"))
        .and(header_exists("x-amz-meta-mtime"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc\""))
        .expect(1)
        .mount(&server)
        .await;

    store.put("notes/todo.txt", &file).await.expect("put succeeds");
}

#[tokio::test]
async fn test_put_server_error_is_unavailable() {
    let (server, store) = common::setup_s3_mock().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, b"a").unwrap();

    Mock::given(method("PUT"))
        .and(path("/test-bucket/a.txt"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(common::error_body("InternalError", "boom")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = store.put("a.txt", &file).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { operation: "put", .. }));
}

#[tokio::test]
async fn test_put_missing_file_never_reaches_server() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = store
        .put("gone.txt", std::path::Path::new("/nonexistent/gone.txt"))
        .await
        .unwrap_err();
    assert!(err.is_local());
}

#[tokio::test]
async fn test_delete_succeeds_on_no_content() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/test-bucket/notes/todo.txt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store.delete("notes/todo.txt").await.expect("delete succeeds");
}

#[tokio::test]
async fn test_delete_missing_object_is_success() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/test-bucket/ghost.txt"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_string(common::error_body("NoSuchKey", "The specified key does not exist.")),
        )
        .mount(&server)
        .await;

    store.delete("ghost.txt").await.expect("idempotent delete");
}

#[tokio::test]
async fn test_delete_access_denied_is_unavailable() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/test-bucket/locked.txt"))
        .respond_with(
            ResponseTemplate::new(403).set_body_string(common::error_body("AccessDenied", "denied")),
        )
        .mount(&server)
        .await;

    let err = store.delete("locked.txt").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { operation: "delete", .. }));
}

#[tokio::test]
async fn test_stat_not_found_is_none() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/test-bucket/missing.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(store.stat("missing.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stat_prefers_mtime_metadata() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/test-bucket/notes/todo.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT")
                .insert_header("x-amz-meta-mtime", "2023-11-14T22:13:20.123456789Z"),
        )
        .mount(&server)
        .await;

    let info = store.stat("notes/todo.txt").await.unwrap().expect("object exists");
    assert_eq!(info.key, "notes/todo.txt");
    assert_eq!(
        info.last_modified,
        Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap()
    );
}

#[tokio::test]
async fn test_stat_falls_back_to_last_modified() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/test-bucket/legacy.txt"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT"),
        )
        .mount(&server)
        .await;

    let info = store.stat("legacy.txt").await.unwrap().unwrap();
    assert_eq!(info.last_modified, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
}

#[tokio::test]
async fn test_stat_server_error_is_unavailable() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/test-bucket/x"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = store.stat("x").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { operation: "stat", .. }));
}
