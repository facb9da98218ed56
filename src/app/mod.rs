//! Core application logic for NWP Fetcher
//!
//! This module contains the pipeline stages for mirroring numerical
//! weather prediction output: product and cadence definitions, cycle
//! scheduling, object store access, availability validation, concurrent
//! fetching, and two-phase archive publishing.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::{TimeZone, Utc};
//! use nwp_fetcher::app::{CycleRequest, FetchConfig, FetchEngine, Product, StoreClient, Validator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Derive the file manifest for one forecast cycle
//! let cycle = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let request = CycleRequest::new(Product::Gfs, "0p25", cycle, 48)?;
//! let manifest = request.schedule();
//!
//! // Confirm the upstream cycle is fully available, then mirror it
//! let client = Arc::new(StoreClient::new());
//! Validator::new(Arc::clone(&client))
//!     .validate(&manifest)
//!     .await?
//!     .ensure_complete()?;
//!
//! let report = FetchEngine::new(client, FetchConfig::default())
//!     .fetch(&manifest)
//!     .await;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod fetch;
pub mod product;
pub mod publish;
pub mod schedule;
pub mod store;
pub mod validate;

// Re-export main public API
pub use fetch::{FetchConfig, FetchEngine, TransferOutcome, TransferReport};
pub use product::{CadenceRange, Product, SourceKind};
pub use publish::{
    ChunkFile, ChunkSet, ObjectSink, PublishConfig, PublishEngine, PublishReport, PublishState,
};
pub use schedule::{CycleRequest, FileDescriptor, Manifest};
pub use store::{StoreClient, StoreKind, StoreUri};
pub use validate::{AvailabilityReport, Validator};
