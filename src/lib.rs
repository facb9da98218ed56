//! NWP Fetcher Library
//!
//! A Rust library for mirroring numerical weather prediction output
//! between object stores. Provides cycle scheduling against product
//! cadence tables, upstream availability validation, concurrent
//! resumable transfers, and two-phase publishing of chunked archives.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_are_sane() {
        assert!(UPLOAD_MAX_RETRIES > 0);
        assert!(DEFAULT_FETCH_CONCURRENCY <= workers::MAX_CONCURRENCY);
        assert!(DEFAULT_PUBLISH_CONCURRENCY <= workers::MAX_CONCURRENCY);
    }
}
