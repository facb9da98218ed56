//! Cycle requests and manifest scheduling
//!
//! A [`CycleRequest`] identifies one forecast run to ingest. It is validated
//! on construction and immutable afterwards; [`CycleRequest::schedule`]
//! derives the ordered file [`Manifest`] from it on demand. Scheduling is
//! pure and deterministic: no I/O happens anywhere in this module.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use crate::app::product::{CadenceRange, Product, SourceKind};
use crate::errors::{ScheduleError, ScheduleResult};

/// One remote/local file the pipeline must move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    /// Opaque source location (resolvable by the store layer)
    pub source_uri: String,
    /// Opaque destination location
    pub destination_uri: String,
    /// Forecast horizon this file represents, in hours
    pub lead_time: u32,
    /// Instant the file's grid values are valid for
    pub valid_time: DateTime<Utc>,
}

/// Ordered sequence of files for one cycle, plus the probes the validator
/// needs. Lead times are unique and strictly increasing in iteration order.
#[derive(Debug, Clone)]
pub struct Manifest {
    product: Product,
    cycle_start: DateTime<Utc>,
    files: Vec<FileDescriptor>,
    /// Source URI of the first file beyond `max_lead_time` under the same
    /// cadence. `None` when nothing follows (request at the product
    /// ceiling) or the source is discovery-based.
    sentinel_uri: Option<String>,
    /// Cycle prefix to list when no sentinel can be computed
    discovery_prefix: Option<String>,
}

impl Manifest {
    /// Files in lead-time order
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Lead times covered by this manifest, ascending
    pub fn lead_times(&self) -> Vec<u32> {
        self.files.iter().map(|f| f.lead_time).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn cycle_start(&self) -> DateTime<Utc> {
        self.cycle_start
    }

    /// Sentinel probe target, if one exists for this source
    pub fn sentinel_uri(&self) -> Option<&str> {
        self.sentinel_uri.as_deref()
    }

    /// Listing prefix for discovery-based validation
    pub fn discovery_prefix(&self) -> Option<&str> {
        self.discovery_prefix.as_deref()
    }
}

/// Identifies one forecast run to ingest
///
/// Constructed once from user/config input and validated closed: a request
/// with a disallowed cycle hour or an over-ceiling lead time is rejected
/// before any I/O.
#[derive(Debug, Clone)]
pub struct CycleRequest {
    product: Product,
    resolution: String,
    cycle_start: DateTime<Utc>,
    max_lead_time: u32,
    source_kind: SourceKind,
    /// True once a kind has been set explicitly; bucket-name inference
    /// only fires while this is false.
    kind_explicit: bool,
    source_root: String,
    destination_root: String,
}

impl CycleRequest {
    /// Create a validated cycle request with default source and
    /// destination roots.
    pub fn new(
        product: Product,
        resolution: &str,
        cycle_start: DateTime<Utc>,
        max_lead_time: u32,
    ) -> ScheduleResult<Self> {
        let request = Self {
            product,
            resolution: resolution.to_string(),
            cycle_start,
            max_lead_time,
            source_kind: SourceKind::Archive,
            kind_explicit: false,
            source_root: format!("gs://{}", product.default_source_bucket()),
            destination_root: crate::constants::stores::DEFAULT_LOCAL_DOWNLOAD_DIR.to_string(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Set the source kind explicitly. This is the primary path; bucket
    /// inference is only a fallback.
    pub fn with_source_kind(mut self, kind: SourceKind) -> ScheduleResult<Self> {
        self.source_kind = kind;
        self.kind_explicit = true;
        self.validate()?;
        Ok(self)
    }

    /// Override the source root (e.g. `gs://bucket`, `s3://bucket/prefix`,
    /// `mem://src`). When no explicit kind was set, the kind is inferred
    /// from the bucket name as a fallback.
    pub fn with_source_root(mut self, root: &str) -> ScheduleResult<Self> {
        self.source_root = root.trim_end_matches('/').to_string();
        if !self.kind_explicit {
            let bucket = bucket_of(&self.source_root);
            self.source_kind = SourceKind::infer_from_bucket(bucket);
        }
        self.validate()?;
        Ok(self)
    }

    /// Override the destination root: a bucket URI or a local directory.
    pub fn with_destination_root(mut self, root: &str) -> Self {
        self.destination_root = root.trim_end_matches('/').to_string();
        self
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn cycle_start(&self) -> DateTime<Utc> {
        self.cycle_start
    }

    pub fn max_lead_time(&self) -> u32 {
        self.max_lead_time
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    fn validate(&self) -> ScheduleResult<()> {
        if self.resolution.is_empty() {
            return Err(ScheduleError::EmptyResolution);
        }

        let hour = self.cycle_start.hour();
        let allowed = self.product.allowed_cycle_hours();
        if !allowed.contains(&hour) {
            return Err(ScheduleError::InvalidCycleHour {
                product: self.product.name(),
                hour,
                allowed,
            });
        }

        if self.max_lead_time == 0 {
            return Err(ScheduleError::ZeroLeadTime);
        }

        let ceiling = self.product.ceiling(self.source_kind);
        if self.max_lead_time > ceiling {
            return Err(ScheduleError::LeadTimeOverCeiling {
                product: self.product.name(),
                requested: self.max_lead_time,
                ceiling,
            });
        }

        Ok(())
    }

    /// Lead times to ingest: the cadence-table union up to `max_lead_time`,
    /// deduplicated and strictly ascending.
    pub fn scheduled_lead_times(&self) -> Vec<u32> {
        lead_times_up_to(self.product.cadence(self.source_kind), self.max_lead_time)
    }

    /// The first lead time beyond `max_lead_time` under the same cadence.
    ///
    /// Its presence upstream proves the last requested file's upload round
    /// fully completed. `None` when the request already reaches the product
    /// ceiling, or when the source is discovery-based (a listing only
    /// returns fully-visible objects, so no sentinel is needed).
    pub fn sentinel_lead_time(&self) -> Option<u32> {
        if self.source_kind.is_discovery_based() {
            return None;
        }
        let cadence = self.product.cadence(self.source_kind);
        let ceiling = self.product.ceiling(self.source_kind);
        lead_times_up_to(cadence, ceiling)
            .into_iter()
            .find(|&t| t > self.max_lead_time)
    }

    /// Derive the manifest for this request. Pure and cheap; callers may
    /// invoke it multiple times.
    pub fn schedule(&self) -> Manifest {
        let files = self
            .scheduled_lead_times()
            .into_iter()
            .map(|lead_time| FileDescriptor {
                source_uri: self.source_uri(lead_time),
                destination_uri: format!(
                    "{}/{}",
                    self.destination_root,
                    self.product
                        .destination_key(&self.resolution, self.cycle_start, lead_time)
                ),
                lead_time,
                valid_time: self.cycle_start + Duration::hours(i64::from(lead_time)),
            })
            .collect();

        let (sentinel_uri, discovery_prefix) = match self.sentinel_lead_time() {
            Some(lead) => (Some(self.source_uri(lead)), None),
            None => (
                None,
                Some(format!(
                    "{}/{}",
                    self.source_root,
                    self.product.source_cycle_prefix(
                        &self.resolution,
                        self.cycle_start,
                        self.source_kind
                    )
                )),
            ),
        };

        Manifest {
            product: self.product,
            cycle_start: self.cycle_start,
            files,
            sentinel_uri,
            discovery_prefix,
        }
    }

    fn source_uri(&self, lead_time: u32) -> String {
        format!(
            "{}/{}",
            self.source_root,
            self.product.source_key(
                &self.resolution,
                self.cycle_start,
                lead_time,
                self.source_kind
            )
        )
    }
}

/// Union of `start..=min(end, max)` by `step` over every cadence range that
/// begins below `max`, deduplicated and sorted. Range endpoints are
/// inclusive, matching the upstream publishing pattern.
fn lead_times_up_to(cadence: &[CadenceRange], max: u32) -> Vec<u32> {
    let mut times = BTreeSet::new();
    for &(start, end, step) in cadence {
        if start >= max {
            break;
        }
        let bound = end.min(max);
        let mut t = start;
        while t <= bound {
            times.insert(t);
            t += step;
        }
    }
    times.into_iter().collect()
}

fn bucket_of(root: &str) -> &str {
    let stripped = root
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(root);
    stripped.split('/').next().unwrap_or(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cycle(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn gfs_request(max: u32) -> CycleRequest {
        CycleRequest::new(Product::Gfs, "0p25", cycle(0), max).unwrap()
    }

    #[test]
    fn test_rejects_bad_cycle_hour() {
        let err = CycleRequest::new(Product::Gfs, "0p25", cycle(3), 24).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCycleHour { hour: 3, .. }));

        // ECMWF only runs at 00z and 12z
        let err = CycleRequest::new(Product::EcmwfHres, "0p25", cycle(6), 24).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCycleHour { hour: 6, .. }));
    }

    #[test]
    fn test_rejects_over_ceiling_lead_time() {
        let err = CycleRequest::new(Product::Gfs, "0p25", cycle(0), 385).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::LeadTimeOverCeiling { ceiling: 384, .. }
        ));
        assert!(CycleRequest::new(Product::Gfs, "0p25", cycle(0), 384).is_ok());
    }

    #[test]
    fn test_rejects_empty_resolution_and_zero_lead() {
        assert!(matches!(
            CycleRequest::new(Product::Gfs, "", cycle(0), 24).unwrap_err(),
            ScheduleError::EmptyResolution
        ));
        assert!(matches!(
            CycleRequest::new(Product::Gfs, "0p25", cycle(0), 0).unwrap_err(),
            ScheduleError::ZeroLeadTime
        ));
    }

    #[test]
    fn test_realtime_kind_shrinks_ceiling() {
        // 240h is fine against the archive but over the realtime horizon
        let request = CycleRequest::new(Product::EcmwfHres, "0p25", cycle(0), 240).unwrap();
        let err = request.with_source_kind(SourceKind::Realtime).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::LeadTimeOverCeiling { ceiling: 90, .. }
        ));
    }

    #[test]
    fn test_kind_inferred_from_bucket_only_as_fallback() {
        let request = CycleRequest::new(Product::EcmwfHres, "0p25", cycle(0), 48)
            .unwrap()
            .with_source_root("gs://ecmwf-realtime")
            .unwrap();
        assert_eq!(request.source_kind(), SourceKind::Realtime);

        // An explicit kind wins over the bucket name
        let request = CycleRequest::new(Product::EcmwfHres, "0p25", cycle(0), 48)
            .unwrap()
            .with_source_kind(SourceKind::Archive)
            .unwrap()
            .with_source_root("gs://ecmwf-realtime")
            .unwrap();
        assert_eq!(request.source_kind(), SourceKind::Archive);
    }

    #[test]
    fn test_lead_times_hourly_example() {
        // max 6 within the hourly range yields [0..=6]
        assert_eq!(gfs_request(6).scheduled_lead_times(), vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_lead_times_cross_cadence_boundary() {
        let times = gfs_request(126).scheduled_lead_times();
        // hourly through 120, then 3-hourly
        assert!(times.contains(&119));
        assert!(times.contains(&120));
        assert!(times.contains(&123));
        assert!(times.contains(&126));
        assert!(!times.contains(&121));
    }

    #[test]
    fn test_lead_times_strictly_ascending_for_all_products() {
        for product in [Product::Gfs, Product::EcmwfHres, Product::EcmwfEns] {
            let ceiling = product.ceiling(SourceKind::Archive);
            for max in [1, 7, ceiling / 2, ceiling] {
                let request = CycleRequest::new(product, "0p25", cycle(0), max).unwrap();
                let times = request.scheduled_lead_times();
                assert!(!times.is_empty());
                assert!(times.windows(2).all(|w| w[0] < w[1]));
                assert!(times.iter().all(|&t| t <= max));
            }
        }
    }

    #[test]
    fn test_sentinel_follows_cadence() {
        // GFS hourly: sentinel is the next hour
        assert_eq!(gfs_request(6).sentinel_lead_time(), Some(7));

        // ENS 3-hourly to 144, then 6-hourly: 144 -> 150, 141 -> 144
        let ens =
            |max| CycleRequest::new(Product::EcmwfEns, "0p25", cycle(0), max).unwrap();
        assert_eq!(ens(144).sentinel_lead_time(), Some(150));
        assert_eq!(ens(141).sentinel_lead_time(), Some(144));

        // At the product ceiling nothing follows
        assert_eq!(gfs_request(384).sentinel_lead_time(), None);
    }

    #[test]
    fn test_discovery_source_has_no_sentinel() {
        let request = CycleRequest::new(Product::EcmwfEns, "0p25", cycle(0), 48)
            .unwrap()
            .with_source_kind(SourceKind::Realtime)
            .unwrap();
        assert_eq!(request.sentinel_lead_time(), None);

        let manifest = request.schedule();
        assert!(manifest.sentinel_uri().is_none());
        assert!(manifest.discovery_prefix().unwrap().contains("enfo/"));
    }

    #[test]
    fn test_schedule_builds_descriptors() {
        let request = gfs_request(2)
            .with_source_root("gs://src-bucket")
            .unwrap()
            .with_destination_root("gs://dst-bucket/nwp");
        let manifest = request.schedule();

        assert_eq!(manifest.len(), 3);
        let first = &manifest.files()[0];
        assert_eq!(
            first.source_uri,
            "gs://src-bucket/gfs.20240101/00/atmos/gfs.t00z.pgrb2.0p25.f000"
        );
        assert_eq!(
            first.destination_uri,
            "gs://dst-bucket/nwp/gfs/0p25/20240101/00/gfs.t00z.pgrb2.0p25.f000"
        );
        assert_eq!(first.valid_time, cycle(0));
        assert_eq!(manifest.files()[2].valid_time, cycle(2));
        assert_eq!(
            manifest.sentinel_uri().unwrap(),
            "gs://src-bucket/gfs.20240101/00/atmos/gfs.t00z.pgrb2.0p25.f003"
        );
    }

    #[test]
    fn test_schedule_is_deterministic() {
        let request = gfs_request(12);
        let a = request.schedule();
        let b = request.schedule();
        assert_eq!(a.files(), b.files());
    }
}
