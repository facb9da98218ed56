//! End-to-end pipeline tests over in-memory stores
//!
//! These exercise the full validate -> fetch -> publish flow the way the
//! CLI drives it, with every store backed by `mem://` buckets and the
//! chunk set on a temporary directory.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use nwp_fetcher::app::{
    ChunkSet, CycleRequest, FetchConfig, FetchEngine, Manifest, Product, PublishConfig,
    PublishEngine, SourceKind, StoreClient, Validator,
};

fn gfs_request(max_lead_time: u32) -> CycleRequest {
    CycleRequest::new(
        Product::Gfs,
        "0p25",
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
        max_lead_time,
    )
    .unwrap()
    .with_source_root("mem://upstream")
    .unwrap()
    .with_destination_root("mem://mirror/nwp")
}

/// Upload every manifest file to the source store, and the sentinel too
/// when `complete` is set.
async fn seed_upstream(client: &StoreClient, manifest: &Manifest, complete: bool) {
    for file in manifest.files() {
        client
            .put(&file.source_uri, Bytes::from_static(b"grib-payload"))
            .await
            .unwrap();
    }
    if complete {
        if let Some(sentinel) = manifest.sentinel_uri() {
            client
                .put(sentinel, Bytes::from_static(b"grib-payload"))
                .await
                .unwrap();
        }
    }
}

fn sample_zarr_store() -> TempDir {
    let dir = TempDir::new().unwrap();
    let files = [
        ("zarr.json", "{\"zarr_format\":3}"),
        ("t2m/zarr.json", "{\"node_type\":\"array\"}"),
        ("t2m/c/0/0", "chunk-a"),
        ("t2m/c/0/1", "chunk-b"),
        ("t2m/c/1/0", "chunk-c"),
    ];
    for (rel, data) in files {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }
    dir
}

#[tokio::test]
async fn test_full_cycle_validate_fetch_publish() {
    let client = Arc::new(StoreClient::new());
    let request = gfs_request(6);
    let manifest = request.schedule();
    seed_upstream(&client, &manifest, true).await;

    // Upstream is complete, validation passes
    let report = Validator::new(Arc::clone(&client))
        .validate(&manifest)
        .await
        .unwrap();
    assert!(report.is_complete());

    // Fetch mirrors every file
    let engine = FetchEngine::new(Arc::clone(&client), FetchConfig::default());
    let report = engine.fetch(&manifest).await;
    assert!(report.is_complete());
    assert_eq!(report.transferred(), 7); // hourly 0..=6

    for file in manifest.files() {
        assert!(client.exists(&file.destination_uri).await.unwrap());
        assert_eq!(
            client.get(&file.destination_uri).await.unwrap(),
            Bytes::from_static(b"grib-payload")
        );
    }

    // A converted archive publishes atomically to its own bucket
    let zarr = sample_zarr_store();
    let chunk_set = ChunkSet::from_dir(zarr.path()).unwrap();
    let publisher = PublishEngine::new(Arc::clone(&client), PublishConfig::default());
    let publish_report = publisher
        .publish(&chunk_set, "mem://published/gfs/0p25/2024-01-01T06")
        .await
        .unwrap();

    assert_eq!(publish_report.chunks_published, 4);
    assert!(publish_report.verified);
    assert!(client
        .exists("mem://published/gfs/0p25/2024-01-01T06/zarr.json")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_incomplete_cycle_blocks_fetch() {
    let client = Arc::new(StoreClient::new());
    let request = gfs_request(6);
    let manifest = request.schedule();

    // Files are up but the sentinel is not: the upload round may still
    // be in flight, so the cycle must not be fetched yet
    seed_upstream(&client, &manifest, false).await;

    let report = Validator::new(Arc::clone(&client))
        .validate(&manifest)
        .await
        .unwrap();
    assert!(!report.is_complete());
    assert!(report.ensure_complete().is_err());
}

#[tokio::test]
async fn test_interrupted_fetch_resumes_without_retransfer() {
    let client = Arc::new(StoreClient::new());
    let request = gfs_request(4);
    let manifest = request.schedule();
    seed_upstream(&client, &manifest, true).await;

    // Simulate an interrupted earlier run that got three files across
    for file in &manifest.files()[..3] {
        client
            .put(&file.destination_uri, Bytes::from_static(b"grib-payload"))
            .await
            .unwrap();
    }

    let engine = FetchEngine::new(Arc::clone(&client), FetchConfig::default());
    let report = engine.fetch(&manifest).await;

    assert!(report.is_complete());
    assert_eq!(report.skipped, 3);
    assert_eq!(report.transferred(), 2);
    assert!(engine.verify(&manifest).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_realtime_cycle_validates_by_listing() {
    let client = Arc::new(StoreClient::new());
    let request = CycleRequest::new(
        Product::EcmwfHres,
        "0p25",
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        12,
    )
    .unwrap()
    .with_source_kind(SourceKind::Realtime)
    .unwrap()
    .with_source_root("mem://realtime-feed")
    .unwrap()
    .with_destination_root("mem://mirror/nwp");
    let manifest = request.schedule();

    // Realtime feeds carry no sentinel; discovery is by prefix listing
    assert!(manifest.sentinel_uri().is_none());
    assert!(manifest.discovery_prefix().is_some());

    seed_upstream(&client, &manifest, true).await;
    let report = Validator::new(Arc::clone(&client))
        .validate(&manifest)
        .await
        .unwrap();
    assert!(report.is_complete());
}
