//! Paginated ListObjectsV2 exposed as a lazy stream.

use futures_util::{StreamExt, TryStreamExt};
use minisync_core::ports::{IObjectStoreClient, StoreError};
use wiremock::matchers::{method, path_regex, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

const BUCKET_PATH: &str = r"^/test-bucket/?$";

#[tokio::test]
async fn test_list_follows_continuation_tokens() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .and(query_param("list-type", "2"))
        .and(query_param("continuation-token", "page-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(common::list_page(&[("docs/c.txt", 30)], None)),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .and(query_param("list-type", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::list_page(
            &[("a.txt", 10), ("b/b.txt", 20)],
            Some("page-2"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let objects: Vec<_> = store.list("").try_collect().await.expect("listing succeeds");

    let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["a.txt", "b/b.txt", "docs/c.txt"]);
    assert_eq!(objects[1].size, 20);
}

#[tokio::test]
async fn test_list_sends_prefix() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .and(query_param("prefix", "photos/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(common::list_page(&[("photos/1.jpg", 1)], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let objects: Vec<_> = store.list("photos/").try_collect().await.unwrap();
    assert_eq!(objects.len(), 1);
}

#[tokio::test]
async fn test_list_is_lazy() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::list_page(&[], None)))
        .expect(0)
        .mount(&server)
        .await;

    // Building the stream issues no request; only polling it does.
    let _stream = store.list("");
}

#[tokio::test]
async fn test_list_error_surfaces_in_stream() {
    let (server, store) = common::setup_s3_mock().await;

    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(common::error_body("InternalError", "boom")),
        )
        .mount(&server)
        .await;

    let mut stream = store.list("");
    let first = stream.next().await.expect("one item");
    assert!(matches!(first, Err(StoreError::Unavailable { operation: "list", .. })));
}
