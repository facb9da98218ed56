//! Application constants for NWP Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Environment variable carrying the forecast cycle (ISO-8601)
    pub const CYCLE: &str = "CYCLE";
}

/// Transfer retry and backoff configuration
pub mod limits {
    use super::Duration;

    /// Maximum retry attempts for a failed chunk upload
    pub const UPLOAD_MAX_RETRIES: u32 = 3;

    /// Base unit for exponential backoff between upload attempts
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Cap on any single backoff delay
    pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

    /// Jitter fraction applied to backoff delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.25;

    /// Timeout for a single upload attempt
    pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of concurrent fetch transfers
    pub const DEFAULT_FETCH_CONCURRENCY: usize = 10;

    /// Default number of concurrent chunk uploads
    pub const DEFAULT_PUBLISH_CONCURRENCY: usize = 16;

    /// Default number of concurrent existence probes during validation
    pub const DEFAULT_PROBE_CONCURRENCY: usize = 32;

    /// Maximum recommended concurrency for any stage
    pub const MAX_CONCURRENCY: usize = 64;
}

/// Object store defaults
pub mod stores {
    /// Public GFS archive bucket on GCS
    pub const GFS_ARCHIVE_BUCKET: &str = "global-forecast-system";

    /// Public ECMWF open-data archive bucket on GCS
    pub const ECMWF_ARCHIVE_BUCKET: &str = "ecmwf-open-data";

    /// Realtime ECMWF feed bucket, used for source-kind inference when no
    /// explicit kind is given
    pub const ECMWF_REALTIME_BUCKET: &str = "ecmwf-realtime";

    /// Default local directory for fetched GRIB files when no
    /// destination bucket is configured
    pub const DEFAULT_LOCAL_DOWNLOAD_DIR: &str = "/tmp/nwp-data";
}

/// Chunked-archive layout constants
pub mod archive {
    /// Consolidated metadata object name (Zarr v3). Its existence at the
    /// destination is the reader-visible signal that the archive is complete.
    pub const CONTROL_FILE_V3: &str = "zarr.json";

    /// Consolidated metadata object name (Zarr v2 archives)
    pub const CONTROL_FILE_V2: &str = ".zmetadata";
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use limits::{RETRY_BASE_DELAY, UPLOAD_MAX_RETRIES, UPLOAD_TIMEOUT};
pub use workers::{DEFAULT_FETCH_CONCURRENCY, DEFAULT_PUBLISH_CONCURRENCY};
