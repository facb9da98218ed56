//! Object store access layer
//!
//! Resolves opaque location strings into (store kind, bucket, key) triples
//! and exposes the minimal operation set the pipeline needs: `exists`,
//! `list`, `copy`, `get`, `put`. Remote stores are backed by the
//! `object_store` crate (GCS, S3, and an in-memory kind for tests); local
//! paths go straight through `tokio::fs`.
//!
//! One [`StoreClient`] is created per process and shared by reference
//! across workers. Per-bucket store handles are built once and cached, so
//! concurrent use never reconfigures a client after workers start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use crate::errors::{StoreError, StoreResult};

/// The kind of store a URI resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Google Cloud Storage (`gs://bucket/key`)
    Gcs,
    /// Amazon S3 or compatible (`s3://bucket/key`)
    S3,
    /// Process-local in-memory store for tests (`mem://bucket/key`)
    Memory,
    /// Local filesystem (plain path)
    Local,
}

/// A parsed store location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUri {
    pub kind: StoreKind,
    /// Bucket name for remote kinds; empty for local paths
    pub bucket: String,
    /// Object key for remote kinds; full path for local
    pub key: String,
}

impl StoreUri {
    /// Parse an opaque location string.
    ///
    /// Strings without a scheme are treated as local filesystem paths.
    pub fn parse(uri: &str) -> StoreResult<Self> {
        if uri.is_empty() {
            return Err(StoreError::InvalidUri {
                uri: uri.to_string(),
                reason: "empty location".to_string(),
            });
        }

        let (kind, rest) = match uri.split_once("://") {
            Some(("gs", rest)) => (StoreKind::Gcs, rest),
            Some(("s3", rest)) => (StoreKind::S3, rest),
            Some(("mem", rest)) => (StoreKind::Memory, rest),
            Some((scheme, _)) => {
                return Err(StoreError::InvalidUri {
                    uri: uri.to_string(),
                    reason: format!("unsupported scheme '{scheme}'"),
                });
            }
            None => {
                return Ok(Self {
                    kind: StoreKind::Local,
                    bucket: String::new(),
                    key: uri.to_string(),
                });
            }
        };

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(StoreError::InvalidUri {
                uri: uri.to_string(),
                reason: "missing bucket".to_string(),
            });
        }

        Ok(Self {
            kind,
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Reassemble a full URI for a key under the same bucket
    fn uri_for(&self, key: &str) -> String {
        let scheme = match self.kind {
            StoreKind::Gcs => "gs",
            StoreKind::S3 => "s3",
            StoreKind::Memory => "mem",
            StoreKind::Local => return key.to_string(),
        };
        format!("{scheme}://{}/{key}", self.bucket)
    }

    /// Whether two locations live in the same remote store instance, which
    /// makes a server-side copy possible.
    pub fn same_store(&self, other: &StoreUri) -> bool {
        self.kind == other.kind && self.kind != StoreKind::Local && self.bucket == other.bucket
    }
}

/// Shared client over every store the pipeline touches
///
/// Cheap to share via `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct StoreClient {
    stores: RwLock<HashMap<(StoreKind, String), Arc<dyn ObjectStore>>>,
}

impl StoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an object (or local file) exists
    pub async fn exists(&self, uri: &str) -> StoreResult<bool> {
        let loc = StoreUri::parse(uri)?;
        if loc.kind == StoreKind::Local {
            return Ok(tokio::fs::try_exists(&loc.key).await?);
        }

        let store = self.store_for(&loc)?;
        match store.head(&ObjectPath::from(loc.key.as_str())).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StoreError::Backend(e)),
        }
    }

    /// List all object URIs under a prefix
    pub async fn list(&self, prefix_uri: &str) -> StoreResult<Vec<String>> {
        let loc = StoreUri::parse(prefix_uri)?;
        if loc.kind == StoreKind::Local {
            return list_local(Path::new(&loc.key));
        }

        let store = self.store_for(&loc)?;
        let prefix = ObjectPath::from(loc.key.trim_end_matches('/'));
        let mut uris = Vec::new();
        let mut stream = store.list(Some(&prefix));
        while let Some(meta) = stream.try_next().await? {
            uris.push(loc.uri_for(meta.location.as_ref()));
        }
        Ok(uris)
    }

    /// Read a whole object into memory
    pub async fn get(&self, uri: &str) -> StoreResult<Bytes> {
        let loc = StoreUri::parse(uri)?;
        if loc.kind == StoreKind::Local {
            let data = tokio::fs::read(&loc.key).await?;
            return Ok(Bytes::from(data));
        }

        let store = self.store_for(&loc)?;
        let result = store.get(&ObjectPath::from(loc.key.as_str())).await?;
        Ok(result.bytes().await?)
    }

    /// Write an object, overwriting any existing one
    pub async fn put(&self, uri: &str, data: Bytes) -> StoreResult<()> {
        let loc = StoreUri::parse(uri)?;
        debug!(uri, size = data.len(), "writing object");
        if loc.kind == StoreKind::Local {
            let path = PathBuf::from(&loc.key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &data).await?;
            return Ok(());
        }

        let store = self.store_for(&loc)?;
        store
            .put(&ObjectPath::from(loc.key.as_str()), data.into())
            .await?;
        Ok(())
    }

    /// Copy one object to another location.
    ///
    /// Within one remote store the copy is server-side and no bytes pass
    /// through this process; across stores (or to/from local paths) the
    /// object streams through memory.
    pub async fn copy(&self, src_uri: &str, dst_uri: &str) -> StoreResult<()> {
        let src = StoreUri::parse(src_uri)?;
        let dst = StoreUri::parse(dst_uri)?;

        if src.same_store(&dst) {
            debug!(src_uri, dst_uri, "server-side copy");
            let store = self.store_for(&src)?;
            store
                .copy(
                    &ObjectPath::from(src.key.as_str()),
                    &ObjectPath::from(dst.key.as_str()),
                )
                .await?;
            return Ok(());
        }

        if src.kind == StoreKind::Local && dst.kind == StoreKind::Local {
            let dst_path = PathBuf::from(&dst.key);
            if let Some(parent) = dst_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&src.key, &dst_path).await?;
            return Ok(());
        }

        debug!(src_uri, dst_uri, "streaming copy");
        let data = self.get(src_uri).await?;
        self.put(dst_uri, data).await
    }

    /// Get or build the store handle for a bucket
    fn store_for(&self, loc: &StoreUri) -> StoreResult<Arc<dyn ObjectStore>> {
        let cache_key = (loc.kind, loc.bucket.clone());
        if let Some(store) = self
            .stores
            .read()
            .expect("store registry poisoned")
            .get(&cache_key)
        {
            return Ok(Arc::clone(store));
        }

        let store: Arc<dyn ObjectStore> = match loc.kind {
            StoreKind::Gcs => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(&loc.bucket)
                    .build()?,
            ),
            StoreKind::S3 => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(&loc.bucket)
                    .build()?,
            ),
            StoreKind::Memory => Arc::new(InMemory::new()),
            StoreKind::Local => unreachable!("local paths bypass the registry"),
        };

        let mut stores = self.stores.write().expect("store registry poisoned");
        // A racing builder may have inserted first; keep the existing
        // handle so every caller shares one instance per bucket.
        let entry = stores.entry(cache_key).or_insert(store);
        Ok(Arc::clone(entry))
    }
}

/// Recursive local listing; a missing directory lists as empty
fn list_local(root: &Path) -> StoreResult<Vec<String>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::Io(e)),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path.to_string_lossy().into_owned());
            }
        }
    }
    files.sort();
    Ok(files)
}
