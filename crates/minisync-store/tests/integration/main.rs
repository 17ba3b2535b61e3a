//! Integration tests for minisync-store
//!
//! Uses wiremock to simulate an S3-compatible endpoint and verifies the
//! request/response handling of S3ObjectStore: bucket creation, uploads,
//! deletes, stat and paginated listing.

mod common;

mod test_bucket;
mod test_listing;
mod test_objects;
