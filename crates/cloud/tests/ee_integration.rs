//! Integration tests against the live Earth Engine REST API.
//!
//! Tests marked `#[ignore]` require network access and credentials:
//! `EARTHENGINE_PROJECT` and `EARTHENGINE_TOKEN` (e.g. from
//! `gcloud auth print-access-token`).
//! Run with: `cargo test -p s1tilex-cloud -- --ignored ee_`

use s1tilex_cloud::blocking::EeClientBlocking;
use s1tilex_cloud::objects::{Geometry, ImageCollection};
use s1tilex_cloud::sentinel1::{DateRange, GROUP_ID, POLARISATION, S1_GRD};
use s1tilex_cloud::{get_info, CloudError, EeClient, EeClientOptions, EeEndpoint};

/// Count Sentinel-1 scenes over the Nile delta in one month.
#[tokio::test]
#[ignore]
async fn ee_collection_size() {
    let client = EeClient::from_env().expect("failed to create client");

    let col = ImageCollection::load(S1_GRD)
        .filter_bounds(&Geometry::rectangle(30.8, 30.5, 31.2, 30.9))
        .filter_date("2021-06-01", "2021-07-01");

    let size = get_info(&client, &col.size()).await.expect("compute failed");
    println!("Found {size} scenes");
    assert!(size.as_u64().unwrap_or(0) > 0, "should find at least one scene");
}

/// Full blocking extraction.
#[test]
#[ignore]
fn ee_extract_tiles_blocking() {
    let client = EeClientBlocking::from_env().expect("failed to create client");

    let table = client
        .extract_tiles(
            &Geometry::rectangle(30.8, 30.5, 31.2, 30.9),
            &DateRange::new("2021-06-01", "2021-06-15"),
        )
        .expect("extraction failed");

    println!("Extracted {} rows", table.len());
    assert!(!table.is_empty());
    assert!(table.has_column(GROUP_ID));

    for (row, value) in table.column(POLARISATION).unwrap().iter().enumerate() {
        let pol = value.as_str().expect("polarisation should be flattened");
        println!("  {:?} {}", table.ids()[row], pol);
        assert!(!pol.starts_with('['));
    }
}

/// A bogus token must surface as an auth error, not a panic.
#[tokio::test]
#[ignore]
async fn ee_bad_token_is_auth_error() {
    let options = EeClientOptions {
        auth: Box::new(s1tilex_cloud::auth::BearerAuth::new("not-a-token")),
        ..EeClientOptions::default()
    };
    let client = EeClient::new(EeEndpoint::Production, "earthengine-public", options)
        .expect("failed to create client");

    let err = get_info(&client, &ImageCollection::load(S1_GRD).size())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Auth(_)), "got {err:?}");
}
