//! NWP product definitions: cadence tables and path templates
//!
//! Each supported product carries an immutable lead-time cadence table, a
//! lead-time ceiling, the admissible cycle hours, and the path-template
//! functions for its upstream archive layout. Everything here is data and
//! pure functions; adding a product means adding a variant, not threading
//! new conditionals through the pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::stores;
use crate::errors::ScheduleError;

/// One row of a cadence table: lead times in `[start, end]` are published
/// every `step` hours. Ranges partition `[0, ceiling]` and overlap only at
/// their shared endpoint.
pub type CadenceRange = (u32, u32, u32);

/// A supported NWP product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Product {
    /// NOAA Global Forecast System
    Gfs,
    /// ECMWF high-resolution deterministic forecast
    EcmwfHres,
    /// ECMWF ensemble forecast
    EcmwfEns,
}

/// How the upstream is reached. The archive mirror and the realtime feed
/// publish different horizons and use different key layouts, so this must
/// be threaded through explicitly rather than inferred from the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Historical archive mirror (full horizon, fixed cadence)
    #[default]
    Archive,
    /// Realtime dissemination feed (shorter horizon, listing-discoverable)
    Realtime,
}

impl SourceKind {
    /// Fallback inference from a known default bucket name, used only when
    /// no explicit kind was configured.
    pub fn infer_from_bucket(bucket: &str) -> Self {
        if bucket == stores::ECMWF_REALTIME_BUCKET {
            SourceKind::Realtime
        } else {
            SourceKind::Archive
        }
    }

    /// Realtime feeds are validated by listing the cycle prefix: a listing
    /// only ever returns fully-visible objects, so no sentinel is needed.
    pub fn is_discovery_based(&self) -> bool {
        matches!(self, SourceKind::Realtime)
    }
}

impl Product {
    /// Canonical product name as used in CLI flags and config files
    pub fn name(&self) -> &'static str {
        match self {
            Product::Gfs => "gfs",
            Product::EcmwfHres => "ecmwf-hres",
            Product::EcmwfEns => "ecmwf-ens",
        }
    }

    /// Cadence table for this product and source kind
    pub fn cadence(&self, kind: SourceKind) -> &'static [CadenceRange] {
        match (self, kind) {
            // GFS: hourly to 120h, 3-hourly to 240h, 12-hourly to 384h
            (Product::Gfs, _) => &[(0, 120, 1), (120, 240, 3), (240, 384, 12)],

            // HRES: hourly to 90h, then 3-hourly; realtime feed stops at 90h
            (Product::EcmwfHres, SourceKind::Archive) => &[(0, 90, 1), (90, 240, 3)],
            (Product::EcmwfHres, SourceKind::Realtime) => &[(0, 90, 1)],

            // ENS: 3-hourly to 144h, then 6-hourly; realtime stops at 144h
            (Product::EcmwfEns, SourceKind::Archive) => &[(0, 144, 3), (144, 360, 6)],
            (Product::EcmwfEns, SourceKind::Realtime) => &[(0, 144, 3)],
        }
    }

    /// Latest publishable lead time for this product and source kind
    pub fn ceiling(&self, kind: SourceKind) -> u32 {
        self.cadence(kind)
            .last()
            .map(|&(_, end, _)| end)
            .unwrap_or(0)
    }

    /// Admissible cycle hours-of-day (UTC)
    pub fn allowed_cycle_hours(&self) -> &'static [u32] {
        match self {
            Product::Gfs => &[0, 6, 12, 18],
            Product::EcmwfHres | Product::EcmwfEns => &[0, 12],
        }
    }

    /// Default upstream bucket for this product
    pub fn default_source_bucket(&self) -> &'static str {
        match self {
            Product::Gfs => stores::GFS_ARCHIVE_BUCKET,
            Product::EcmwfHres | Product::EcmwfEns => stores::ECMWF_ARCHIVE_BUCKET,
        }
    }

    /// Source object key for one lead time.
    ///
    /// Templates are string contracts with the upstream layout, fixed at
    /// compile time; any upstream layout change requires a new template.
    pub fn source_key(
        &self,
        resolution: &str,
        cycle: DateTime<Utc>,
        lead_time: u32,
        kind: SourceKind,
    ) -> String {
        let date = cycle.format("%Y%m%d");
        let hh = cycle.hour();
        match (self, kind) {
            (Product::Gfs, _) => format!(
                "gfs.{date}/{hh:02}/atmos/gfs.t{hh:02}z.pgrb2.{resolution}.f{lead_time:03}"
            ),
            (Product::EcmwfHres, SourceKind::Archive) => format!(
                "ecmwf/hres/{date}/{hh:02}/{resolution}/ecmwf.hres.{hh:02}z.{resolution}.f{lead_time:03}.grib"
            ),
            (Product::EcmwfEns, SourceKind::Archive) => format!(
                "ecmwf/ens/{date}/{hh:02}/{resolution}/ecmwf.ens.{hh:02}z.{resolution}.f{lead_time:03}.grib"
            ),
            (Product::EcmwfHres, SourceKind::Realtime) => format!(
                "{date}/{hh:02}z/ifs/{resolution}/oper/{date}{hh:02}0000-{lead_time}h-oper-fc.grib2"
            ),
            (Product::EcmwfEns, SourceKind::Realtime) => format!(
                "{date}/{hh:02}z/ifs/{resolution}/enfo/{date}{hh:02}0000-{lead_time}h-enfo-fc.grib2"
            ),
        }
    }

    /// Source key prefix covering one whole cycle, for listing-based
    /// discovery.
    pub fn source_cycle_prefix(
        &self,
        resolution: &str,
        cycle: DateTime<Utc>,
        kind: SourceKind,
    ) -> String {
        let date = cycle.format("%Y%m%d");
        let hh = cycle.hour();
        match (self, kind) {
            (Product::Gfs, _) => format!("gfs.{date}/{hh:02}/atmos/"),
            (Product::EcmwfHres, SourceKind::Archive) => {
                format!("ecmwf/hres/{date}/{hh:02}/{resolution}/")
            }
            (Product::EcmwfEns, SourceKind::Archive) => {
                format!("ecmwf/ens/{date}/{hh:02}/{resolution}/")
            }
            (Product::EcmwfHres, SourceKind::Realtime) => {
                format!("{date}/{hh:02}z/ifs/{resolution}/oper/")
            }
            (Product::EcmwfEns, SourceKind::Realtime) => {
                format!("{date}/{hh:02}z/ifs/{resolution}/enfo/")
            }
        }
    }

    /// Destination object key for one lead time, relative to the
    /// destination prefix. The layout is ours, so it is uniform across
    /// source kinds.
    pub fn destination_key(
        &self,
        resolution: &str,
        cycle: DateTime<Utc>,
        lead_time: u32,
    ) -> String {
        let date = cycle.format("%Y%m%d");
        let hh = cycle.hour();
        match self {
            Product::Gfs => format!(
                "gfs/{resolution}/{date}/{hh:02}/gfs.t{hh:02}z.pgrb2.{resolution}.f{lead_time:03}"
            ),
            Product::EcmwfHres => format!(
                "ecmwf/hres/{resolution}/{date}/{hh:02}/ecmwf.hres.{hh:02}z.{resolution}.f{lead_time:03}.grib"
            ),
            Product::EcmwfEns => format!(
                "ecmwf/ens/{resolution}/{date}/{hh:02}/ecmwf.ens.{hh:02}z.{resolution}.f{lead_time:03}.grib"
            ),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Product {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gfs" => Ok(Product::Gfs),
            "ecmwf-hres" => Ok(Product::EcmwfHres),
            "ecmwf-ens" => Ok(Product::EcmwfEns),
            other => Err(ScheduleError::UnknownProduct {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Archive => "archive",
            SourceKind::Realtime => "realtime",
        })
    }
}

impl FromStr for SourceKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive" => Ok(SourceKind::Archive),
            "realtime" => Ok(SourceKind::Realtime),
            other => Err(ScheduleError::UnknownSourceKind {
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cycle() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_cadence_ranges_partition_the_horizon() {
        for product in [Product::Gfs, Product::EcmwfHres, Product::EcmwfEns] {
            for kind in [SourceKind::Archive, SourceKind::Realtime] {
                let cadence = product.cadence(kind);
                assert_eq!(cadence[0].0, 0);
                for pair in cadence.windows(2) {
                    assert_eq!(pair[0].1, pair[1].0, "ranges must share endpoints");
                }
                assert_eq!(cadence.last().unwrap().1, product.ceiling(kind));
            }
        }
    }

    #[test]
    fn test_realtime_ceiling_is_shorter() {
        assert_eq!(Product::EcmwfHres.ceiling(SourceKind::Archive), 240);
        assert_eq!(Product::EcmwfHres.ceiling(SourceKind::Realtime), 90);
        assert_eq!(Product::EcmwfEns.ceiling(SourceKind::Archive), 360);
        assert_eq!(Product::EcmwfEns.ceiling(SourceKind::Realtime), 144);
        // GFS is unaffected by the source kind
        assert_eq!(Product::Gfs.ceiling(SourceKind::Realtime), 384);
    }

    #[test]
    fn test_source_kind_inference_fallback() {
        assert_eq!(
            SourceKind::infer_from_bucket(stores::ECMWF_REALTIME_BUCKET),
            SourceKind::Realtime
        );
        assert_eq!(
            SourceKind::infer_from_bucket("some-archive-mirror"),
            SourceKind::Archive
        );
    }

    #[test]
    fn test_gfs_path_templates() {
        let key = Product::Gfs.source_key("0p25", cycle(), 6, SourceKind::Archive);
        assert_eq!(key, "gfs.20240101/00/atmos/gfs.t00z.pgrb2.0p25.f006");

        let dest = Product::Gfs.destination_key("0p25", cycle(), 6);
        assert_eq!(dest, "gfs/0p25/20240101/00/gfs.t00z.pgrb2.0p25.f006");
    }

    #[test]
    fn test_ecmwf_realtime_key_layout() {
        let key = Product::EcmwfEns.source_key("0p25", cycle(), 12, SourceKind::Realtime);
        assert_eq!(key, "20240101/00z/ifs/0p25/enfo/20240101000000-12h-enfo-fc.grib2");
    }

    #[test]
    fn test_product_round_trip() {
        for name in ["gfs", "ecmwf-hres", "ecmwf-ens"] {
            let product: Product = name.parse().unwrap();
            assert_eq!(product.to_string(), name);
        }
        assert!("icon".parse::<Product>().is_err());
    }

    #[test]
    fn test_allowed_cycle_hours() {
        assert_eq!(Product::Gfs.allowed_cycle_hours(), &[0, 6, 12, 18]);
        assert_eq!(Product::EcmwfEns.allowed_cycle_hours(), &[0, 12]);
    }
}
