//! Shared helpers for S3 integration tests
//!
//! Every helper returns a store pointed at a fresh wiremock server using
//! path-style addressing, so object requests arrive as `/<bucket>/<key>`.

use minisync_core::config::StoreConfig;
use minisync_store::S3ObjectStore;
use wiremock::MockServer;

pub const BUCKET: &str = "test-bucket";

pub async fn setup_s3_mock() -> (MockServer, S3ObjectStore) {
    let server = MockServer::start().await;
    let store = store_for(&server, "us-east-1").await;
    (server, store)
}

pub async fn store_for(server: &MockServer, region: &str) -> S3ObjectStore {
    let config = StoreConfig {
        endpoint: server.uri(),
        bucket: BUCKET.to_string(),
        region: region.to_string(),
        access_key: "test-access-key".to_string(),
        secret_key: "test-secret-key".to_string(),
        force_path_style: true,
    };
    S3ObjectStore::connect(&config).await
}

/// S3 XML error body.
pub fn error_body(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>{code}</Code><Message>{message}</Message><RequestId>req-1</RequestId></Error>"#
    )
}

/// One `ListObjectsV2` page. `objects` are `(key, size)` pairs.
pub fn list_page(objects: &[(&str, u64)], next_token: Option<&str>) -> String {
    let contents: String = objects
        .iter()
        .map(|(key, size)| {
            format!(
                "<Contents><Key>{key}</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified>\
                 <ETag>\"etag\"</ETag><Size>{size}</Size><StorageClass>STANDARD</StorageClass></Contents>"
            )
        })
        .collect();
    let truncation = match next_token {
        Some(token) => format!(
            "<IsTruncated>true</IsTruncated><NextContinuationToken>{token}</NextContinuationToken>"
        ),
        None => "<IsTruncated>false</IsTruncated>".to_string(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>{BUCKET}</Name><Prefix></Prefix><KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys>{truncation}{contents}</ListBucketResult>"#,
        objects.len()
    )
}
