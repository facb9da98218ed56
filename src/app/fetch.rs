//! Concurrent fetch engine
//!
//! Copies every file in a manifest from the source store to the
//! destination with bounded concurrency. Each file is handled
//! independently: a missing source or a failed copy is recorded and the
//! batch drains to completion regardless. Partial failure is a normal,
//! reportable outcome, not an exception that unwinds the batch.
//!
//! Re-running with `overwrite=false` is the retry mechanism: destinations
//! that already exist are skipped as successes, so the existence of the
//! destination object is the only resume checkpoint.

use std::sync::Arc;

use futures::{stream, StreamExt};
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::app::schedule::Manifest;
use crate::app::store::StoreClient;
use crate::constants::workers;
use crate::errors::{StoreResult, TransferError};

/// Fetch engine settings
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Re-transfer files whose destination already exists
    pub overwrite: bool,
    /// Number of files in flight at once
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            concurrency: workers::DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

/// Per-file result of one transfer
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub source_uri: String,
    pub destination_uri: String,
    pub succeeded: bool,
    /// True when the destination already existed and was left alone
    pub skipped: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Aggregated result of one fetch batch
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<(String, String)>,
    pub outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of files whose bytes actually moved
    pub fn transferred(&self) -> usize {
        self.succeeded - self.skipped
    }

    pub fn summary(&self) -> String {
        format!(
            "{} total, {} succeeded ({} skipped as existing), {} failed",
            self.total,
            self.succeeded,
            self.skipped,
            self.failed.len()
        )
    }
}

/// Concurrent manifest fetcher
#[derive(Debug)]
pub struct FetchEngine {
    client: Arc<StoreClient>,
    config: FetchConfig,
}

impl FetchEngine {
    pub fn new(client: Arc<StoreClient>, config: FetchConfig) -> Self {
        Self { client, config }
    }

    /// Transfer every manifest file, draining the batch to completion.
    pub async fn fetch(&self, manifest: &Manifest) -> TransferReport {
        self.fetch_with_progress(manifest, None).await
    }

    /// As [`FetchEngine::fetch`], ticking a progress bar per finished file.
    pub async fn fetch_with_progress(
        &self,
        manifest: &Manifest,
        progress: Option<&ProgressBar>,
    ) -> TransferReport {
        info!(
            files = manifest.len(),
            concurrency = self.config.concurrency,
            overwrite = self.config.overwrite,
            "starting fetch"
        );

        let mut outcomes: Vec<(usize, TransferOutcome)> =
            stream::iter(manifest.files().iter().enumerate().map(|(index, file)| {
                let client = Arc::clone(&self.client);
                let overwrite = self.config.overwrite;
                async move {
                    let outcome = transfer_one(
                        &client,
                        &file.source_uri,
                        &file.destination_uri,
                        overwrite,
                    )
                    .await;
                    if let Some(bar) = progress {
                        bar.inc(1);
                    }
                    (index, outcome)
                }
            }))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        // Completion order is unconstrained; report in manifest order
        outcomes.sort_by_key(|&(index, _)| index);
        let outcomes: Vec<TransferOutcome> =
            outcomes.into_iter().map(|(_, outcome)| outcome).collect();

        let report = TransferReport {
            total: outcomes.len(),
            succeeded: outcomes.iter().filter(|o| o.succeeded).count(),
            skipped: outcomes.iter().filter(|o| o.skipped).count(),
            failed: outcomes
                .iter()
                .filter(|o| !o.succeeded)
                .map(|o| {
                    (
                        o.source_uri.clone(),
                        o.error.clone().unwrap_or_else(|| "unknown".to_string()),
                    )
                })
                .collect(),
            outcomes,
        };

        if report.is_complete() {
            info!("fetch finished: {}", report.summary());
        } else {
            warn!("fetch finished with failures: {}", report.summary());
            for (uri, error) in report.failed.iter().take(10) {
                warn!(uri, error, "transfer failed");
            }
        }

        report
    }

    /// Post-fetch audit: re-probe every destination and return the URIs
    /// that are missing.
    pub async fn verify(&self, manifest: &Manifest) -> StoreResult<Vec<String>> {
        let mut missing = Vec::new();
        for file in manifest.files() {
            if !self.client.exists(&file.destination_uri).await? {
                missing.push(file.destination_uri.clone());
            }
        }
        if missing.is_empty() {
            info!(files = manifest.len(), "all destinations verified present");
        } else {
            warn!(missing = missing.len(), "destinations missing after fetch");
        }
        Ok(missing)
    }
}

async fn transfer_one(
    client: &StoreClient,
    source_uri: &str,
    destination_uri: &str,
    overwrite: bool,
) -> TransferOutcome {
    let outcome = |succeeded, skipped, attempts, error: Option<String>| TransferOutcome {
        source_uri: source_uri.to_string(),
        destination_uri: destination_uri.to_string(),
        succeeded,
        skipped,
        attempts,
        error,
    };

    match run_transfer(client, source_uri, destination_uri, overwrite).await {
        Ok(true) => {
            debug!(destination_uri, "skipping existing file");
            outcome(true, true, 0, None)
        }
        Ok(false) => {
            debug!(source_uri, destination_uri, "transferred");
            outcome(true, false, 1, None)
        }
        Err(e) => outcome(false, false, 1, Some(e.to_string())),
    }
}

/// Returns `Ok(true)` when the destination already existed and was skipped.
async fn run_transfer(
    client: &StoreClient,
    source_uri: &str,
    destination_uri: &str,
    overwrite: bool,
) -> Result<bool, TransferError> {
    if !overwrite && client.exists(destination_uri).await? {
        return Ok(true);
    }

    if !client.exists(source_uri).await? {
        return Err(TransferError::SourceMissing {
            uri: source_uri.to_string(),
        });
    }

    client.copy(source_uri, destination_uri).await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::product::Product;
    use crate::app::schedule::CycleRequest;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    fn manifest(max: u32) -> Manifest {
        CycleRequest::new(
            Product::Gfs,
            "0p25",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            max,
        )
        .unwrap()
        .with_source_root("mem://upstream")
        .unwrap()
        .with_destination_root("mem://mirror/nwp")
        .schedule()
    }

    async fn seed_sources(client: &StoreClient, manifest: &Manifest) {
        for file in manifest.files() {
            client
                .put(&file.source_uri, Bytes::from_static(b"grib"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_fetch_skips_prepopulated_destinations() {
        let client = Arc::new(StoreClient::new());
        let manifest = manifest(4); // 5 descriptors
        seed_sources(&client, &manifest).await;

        // Pre-populate 2 of the 5 destinations
        for file in &manifest.files()[..2] {
            client
                .put(&file.destination_uri, Bytes::from_static(b"grib"))
                .await
                .unwrap();
        }

        let engine = FetchEngine::new(Arc::clone(&client), FetchConfig::default());
        let report = engine.fetch(&manifest).await;

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.transferred(), 3);
        assert!(report.failed.is_empty());

        assert!(engine.verify(&manifest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent() {
        let client = Arc::new(StoreClient::new());
        let manifest = manifest(3);
        seed_sources(&client, &manifest).await;

        let engine = FetchEngine::new(Arc::clone(&client), FetchConfig::default());
        let first = engine.fetch(&manifest).await;
        assert_eq!(first.transferred(), 4);

        // Second run transfers nothing and succeeds identically
        let second = engine.fetch(&manifest).await;
        assert_eq!(second.total, first.total);
        assert_eq!(second.succeeded, first.succeeded);
        assert_eq!(second.skipped, second.total);
        assert_eq!(second.transferred(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_fails_only_that_file() {
        let client = Arc::new(StoreClient::new());
        let manifest = manifest(2);

        // Seed all sources except lead 1
        for file in manifest.files() {
            if file.lead_time != 1 {
                client
                    .put(&file.source_uri, Bytes::from_static(b"grib"))
                    .await
                    .unwrap();
            }
        }

        let engine = FetchEngine::new(Arc::clone(&client), FetchConfig::default());
        let report = engine.fetch(&manifest).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("not found"));

        // The other files landed despite the failure
        let missing = engine.verify(&manifest).await.unwrap();
        assert_eq!(missing.len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_retransfers_existing() {
        let client = Arc::new(StoreClient::new());
        let manifest = manifest(1);
        seed_sources(&client, &manifest).await;

        let engine = FetchEngine::new(Arc::clone(&client), FetchConfig::default());
        engine.fetch(&manifest).await;

        let engine = FetchEngine::new(
            Arc::clone(&client),
            FetchConfig {
                overwrite: true,
                ..FetchConfig::default()
            },
        );
        let report = engine.fetch(&manifest).await;
        assert_eq!(report.skipped, 0);
        assert_eq!(report.transferred(), 2);
    }
}
