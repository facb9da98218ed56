//! Pre-fetch completeness validation
//!
//! Upstream forecast producers publish files incrementally over hours. If
//! the pipeline starts fetching while a cycle is still being produced it
//! silently ingests a truncated forecast, so the validator checks the whole
//! manifest — plus one sentinel file beyond it — before any transfer
//! begins. Existence of the sentinel is strong evidence the last requested
//! file's upload round fully completed, which plain existence of that file
//! is not in an eventually-consistent store.
//!
//! The validator reports; it never retries. A missing sentinel alone means
//! the cycle is likely still producing (safe to retry later), while missing
//! required files may indicate a data outage upstream.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{stream, StreamExt};
use tracing::{debug, info, warn};

use crate::app::schedule::Manifest;
use crate::app::store::StoreClient;
use crate::constants::workers;
use crate::errors::{ValidationError, ValidationResult};

/// Result of a completeness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityReport {
    /// Every required file and the sentinel are present upstream
    Complete,
    /// The cycle is not fully published
    MissingFiles {
        /// Lead times (≤ max) whose files are absent
        required: Vec<u32>,
        /// Lead times whose files are present, for diagnostics
        available: Vec<u32>,
        /// Whether only the sentinel is missing
        sentinel_missing: bool,
    },
}

impl AvailabilityReport {
    pub fn is_complete(&self) -> bool {
        matches!(self, AvailabilityReport::Complete)
    }

    /// Escalate an incomplete report into a typed error for callers that
    /// treat incompleteness as fatal to the invocation.
    pub fn ensure_complete(self) -> ValidationResult<()> {
        match self {
            AvailabilityReport::Complete => Ok(()),
            AvailabilityReport::MissingFiles {
                required,
                available,
                sentinel_missing,
            } => Err(ValidationError::Incomplete {
                required,
                available,
                sentinel_missing,
            }),
        }
    }
}

/// Checks that a forecast cycle is fully published upstream
#[derive(Debug)]
pub struct Validator {
    client: Arc<StoreClient>,
    probe_concurrency: usize,
}

impl Validator {
    pub fn new(client: Arc<StoreClient>) -> Self {
        Self {
            client,
            probe_concurrency: workers::DEFAULT_PROBE_CONCURRENCY,
        }
    }

    pub fn with_probe_concurrency(mut self, concurrency: usize) -> Self {
        self.probe_concurrency = concurrency.max(1);
        self
    }

    /// Probe every manifest file plus the sentinel.
    ///
    /// When the manifest carries no sentinel (discovery-based source, or a
    /// request at the product ceiling), a single prefix listing stands in
    /// for the probes: listings only ever return fully-visible objects.
    pub async fn validate(&self, manifest: &Manifest) -> ValidationResult<AvailabilityReport> {
        let presence = match manifest.discovery_prefix() {
            Some(prefix) => self.presence_by_listing(manifest, prefix).await?,
            None => self.presence_by_probes(manifest).await?,
        };

        let mut required = Vec::new();
        let mut available = Vec::new();
        for (lead_time, present) in presence {
            if present {
                available.push(lead_time);
            } else {
                required.push(lead_time);
            }
        }

        let sentinel_missing = match manifest.sentinel_uri() {
            Some(uri) => {
                let present = self.client.exists(uri).await?;
                if !present {
                    debug!(sentinel = uri, "sentinel not yet published");
                }
                !present
            }
            None => false,
        };

        if required.is_empty() && !sentinel_missing {
            info!(
                files = manifest.len(),
                "cycle complete upstream, all files present"
            );
            return Ok(AvailabilityReport::Complete);
        }

        if required.is_empty() {
            info!("cycle likely still producing: sentinel not yet present");
        } else {
            warn!(
                missing = required.len(),
                available = available.len(),
                "required files missing upstream"
            );
        }

        Ok(AvailabilityReport::MissingFiles {
            required,
            available,
            sentinel_missing,
        })
    }

    async fn presence_by_probes(
        &self,
        manifest: &Manifest,
    ) -> ValidationResult<Vec<(u32, bool)>> {
        let results: Vec<(u32, ValidationResult<bool>)> =
            stream::iter(manifest.files().iter().map(|file| {
                let client = Arc::clone(&self.client);
                async move {
                    let present = client.exists(&file.source_uri).await;
                    (file.lead_time, present.map_err(ValidationError::from))
                }
            }))
            .buffer_unordered(self.probe_concurrency)
            .collect()
            .await;

        let mut presence = Vec::with_capacity(results.len());
        for (lead_time, result) in results {
            presence.push((lead_time, result?));
        }
        presence.sort_by_key(|&(lead_time, _)| lead_time);
        Ok(presence)
    }

    async fn presence_by_listing(
        &self,
        manifest: &Manifest,
        prefix: &str,
    ) -> ValidationResult<Vec<(u32, bool)>> {
        let visible: HashSet<String> = self.client.list(prefix).await?.into_iter().collect();
        debug!(prefix, objects = visible.len(), "discovered objects by listing");
        Ok(manifest
            .files()
            .iter()
            .map(|file| (file.lead_time, visible.contains(&file.source_uri)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::product::{Product, SourceKind};
    use crate::app::schedule::CycleRequest;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    fn request(max: u32) -> CycleRequest {
        CycleRequest::new(
            Product::Gfs,
            "0p25",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            max,
        )
        .unwrap()
        .with_source_root("mem://upstream")
        .unwrap()
        .with_destination_root("mem://mirror")
    }

    async fn seed(client: &StoreClient, uris: &[&str]) {
        for uri in uris {
            client.put(uri, Bytes::from_static(b"x")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_complete_cycle() {
        let client = Arc::new(StoreClient::new());
        let manifest = request(2).schedule();

        for file in manifest.files() {
            seed(&client, &[file.source_uri.as_str()]).await;
        }
        seed(&client, &[manifest.sentinel_uri().unwrap()]).await;

        let report = Validator::new(client).validate(&manifest).await.unwrap();
        assert!(report.is_complete());
        assert!(report.ensure_complete().is_ok());
    }

    #[tokio::test]
    async fn test_sentinel_missing_is_reported_distinctly() {
        // Lead times 0-6 present, sentinel (7) absent: still producing
        let client = Arc::new(StoreClient::new());
        let manifest = request(6).schedule();
        for file in manifest.files() {
            seed(&client, &[file.source_uri.as_str()]).await;
        }

        let report = Validator::new(client).validate(&manifest).await.unwrap();
        assert_eq!(
            report,
            AvailabilityReport::MissingFiles {
                required: vec![],
                available: vec![0, 1, 2, 3, 4, 5, 6],
                sentinel_missing: true,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_required_lead_time() {
        // Lead 3 absent but sentinel present
        let client = Arc::new(StoreClient::new());
        let manifest = request(6).schedule();
        for file in manifest.files() {
            if file.lead_time != 3 {
                seed(&client, &[file.source_uri.as_str()]).await;
            }
        }
        seed(&client, &[manifest.sentinel_uri().unwrap()]).await;

        let report = Validator::new(client).validate(&manifest).await.unwrap();
        assert_eq!(
            report,
            AvailabilityReport::MissingFiles {
                required: vec![3],
                available: vec![0, 1, 2, 4, 5, 6],
                sentinel_missing: false,
            }
        );

        let err = report.ensure_complete().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Incomplete { sentinel_missing: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_discovery_source_validates_by_listing() {
        let client = Arc::new(StoreClient::new());
        let request = CycleRequest::new(
            Product::EcmwfEns,
            "0p25",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            6,
        )
        .unwrap()
        .with_source_kind(SourceKind::Realtime)
        .unwrap()
        .with_source_root("mem://realtime")
        .unwrap();
        let manifest = request.schedule();
        assert!(manifest.sentinel_uri().is_none());

        // Only leads 0 and 3 visible in the listing
        for file in &manifest.files()[..2] {
            seed(&client, &[file.source_uri.as_str()]).await;
        }

        let report = Validator::new(client).validate(&manifest).await.unwrap();
        assert_eq!(
            report,
            AvailabilityReport::MissingFiles {
                required: vec![6],
                available: vec![0, 3],
                sentinel_missing: false,
            }
        );
    }
}
