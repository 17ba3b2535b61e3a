//! Bucket bootstrap: create, tolerate existing, fall back to HeadBucket.

use minisync_core::ports::{IObjectStoreClient, StoreError};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

const BUCKET_PATH: &str = r"^/test-bucket/?$";

#[tokio::test]
async fn test_ensure_bucket_creates_bucket() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("PUT"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store.ensure_bucket().await.expect("bucket created");
}

#[tokio::test]
async fn test_ensure_bucket_accepts_already_owned() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("PUT"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_string(common::error_body(
            "BucketAlreadyOwnedByYou",
            "Your previous request to create the named bucket succeeded",
        )))
        .mount(&server)
        .await;

    store.ensure_bucket().await.expect("existing bucket is fine");
}

#[tokio::test]
async fn test_ensure_bucket_falls_back_to_head_bucket() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("PUT"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(
            ResponseTemplate::new(403).set_body_string(common::error_body("AccessDenied", "denied")),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store.ensure_bucket().await.expect("bucket reachable");
}

#[tokio::test]
async fn test_ensure_bucket_fails_when_unreachable() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("PUT"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(common::error_body("InternalError", "boom")),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = store.ensure_bucket().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { operation: "ensure_bucket", .. }));
}
