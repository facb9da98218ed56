//! Two-phase chunked-archive publisher
//!
//! Publishes a locally-built chunked archive (a Zarr store) to an object
//! store so that readers never observe a partially-written archive. The
//! consolidated metadata object is the control file: readers open the
//! archive through it, so it must land last. Phase one uploads every
//! chunk with bounded concurrency and per-chunk retries; only when all
//! chunks are confirmed does phase two upload the control file. A failed
//! chunk therefore leaves the destination invisible to readers and the
//! whole publish can simply be re-run.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt};
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::app::store::StoreClient;
use crate::constants::{archive, limits, workers};
use crate::errors::{PublishError, PublishResult, StoreResult};

/// Destination-side operations the publisher needs.
///
/// [`StoreClient`] is the production implementation; tests substitute
/// fault-injecting doubles to exercise failure ordering.
pub trait ObjectSink: Send + Sync {
    fn put(&self, uri: &str, data: Bytes) -> impl Future<Output = StoreResult<()>> + Send;
    fn exists(&self, uri: &str) -> impl Future<Output = StoreResult<bool>> + Send;
    fn list(&self, prefix: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;
}

impl ObjectSink for StoreClient {
    async fn put(&self, uri: &str, data: Bytes) -> StoreResult<()> {
        StoreClient::put(self, uri, data).await
    }

    async fn exists(&self, uri: &str) -> StoreResult<bool> {
        StoreClient::exists(self, uri).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        StoreClient::list(self, prefix).await
    }
}

/// One file of a chunked archive on local disk
#[derive(Debug, Clone)]
pub struct ChunkFile {
    /// Path relative to the archive root, `/`-separated (the object key
    /// suffix at the destination)
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
}

/// A scanned local archive: its control file plus every chunk
#[derive(Debug, Clone)]
pub struct ChunkSet {
    root: PathBuf,
    control: ChunkFile,
    chunks: Vec<ChunkFile>,
}

impl ChunkSet {
    /// Scan an archive directory on disk.
    ///
    /// The control file is `zarr.json` at the root, falling back to
    /// `.zmetadata` for v2 stores; every other file is a chunk. An
    /// archive without a control file cannot be published atomically and
    /// is rejected.
    pub fn from_dir(root: &Path) -> PublishResult<Self> {
        let mut files = Vec::new();
        walk_dir(root, root, &mut files)?;
        if files.is_empty() {
            return Err(PublishError::EmptyChunkSet {
                path: root.to_path_buf(),
            });
        }

        let control_name = [archive::CONTROL_FILE_V3, archive::CONTROL_FILE_V2]
            .into_iter()
            .find(|name| files.iter().any(|f| f.relative_path == *name))
            .ok_or_else(|| PublishError::ControlFileMissing {
                path: root.to_path_buf(),
            })?;

        let control_index = files
            .iter()
            .position(|f| f.relative_path == control_name)
            .unwrap();
        let control = files.remove(control_index);
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        Ok(Self {
            root: root.to_path_buf(),
            control,
            chunks: files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn control(&self) -> &ChunkFile {
        &self.control
    }

    pub fn chunks(&self) -> &[ChunkFile] {
        &self.chunks
    }

    /// Chunk count, excluding the control file
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|f| f.size).sum::<u64>() + self.control.size
    }
}

fn walk_dir(root: &Path, dir: &Path, out: &mut Vec<ChunkFile>) -> PublishResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            walk_dir(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .expect("walked path is under its root")
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(ChunkFile {
                relative_path: relative,
                absolute_path: path,
                size: meta.len(),
            });
        }
    }
    Ok(())
}

/// Publish engine settings
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Number of chunk uploads in flight at once
    pub concurrency: usize,
    /// Retries per chunk after the first attempt
    pub max_retries: u32,
    /// Timeout for a single upload attempt
    pub attempt_timeout: Duration,
    /// Re-list the destination after the control file lands
    pub verify: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            concurrency: workers::DEFAULT_PUBLISH_CONCURRENCY,
            max_retries: limits::UPLOAD_MAX_RETRIES,
            attempt_timeout: limits::UPLOAD_TIMEOUT,
            verify: true,
        }
    }
}

/// Lifecycle of one publish invocation.
///
/// Terminal states are reported, never retried automatically; retry is
/// always a fresh, whole-invocation re-publish initiated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Idle,
    UploadingChunks,
    /// Terminal: one or more chunks exhausted retries
    ChunksFailed,
    ChunksComplete,
    UploadingControl,
    /// Terminal: the control file upload failed after all chunks landed
    ControlFailed,
    /// Terminal when verification is disabled
    Published,
    /// Terminal: the destination listing does not match the chunk set
    VerifyFailed,
    /// Terminal: listing audit passed
    Verified,
}

impl PublishState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PublishState::ChunksFailed
                | PublishState::ControlFailed
                | PublishState::Published
                | PublishState::VerifyFailed
                | PublishState::Verified
        )
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PublishState::Idle => "idle",
            PublishState::UploadingChunks => "uploading-chunks",
            PublishState::ChunksFailed => "chunks-failed",
            PublishState::ChunksComplete => "chunks-complete",
            PublishState::UploadingControl => "uploading-control",
            PublishState::ControlFailed => "control-failed",
            PublishState::Published => "published",
            PublishState::VerifyFailed => "verify-failed",
            PublishState::Verified => "verified",
        })
    }
}

/// Result of a completed publish
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub chunks_published: usize,
    pub bytes_published: u64,
    pub control_uri: String,
    pub verified: bool,
    /// Terminal state reached: `Verified`, or `Published` when the
    /// listing audit is disabled
    pub state: PublishState,
}

/// Uploads a [`ChunkSet`] to a destination prefix, control file last.
#[derive(Debug)]
pub struct PublishEngine<S: ObjectSink> {
    sink: Arc<S>,
    config: PublishConfig,
    state: Mutex<PublishState>,
}

impl<S: ObjectSink> PublishEngine<S> {
    pub fn new(sink: Arc<S>, config: PublishConfig) -> Self {
        Self {
            sink,
            config,
            state: Mutex::new(PublishState::Idle),
        }
    }

    /// State of the current or most recent publish invocation
    pub fn state(&self) -> PublishState {
        *self.state.lock().expect("publish state poisoned")
    }

    fn set_state(&self, next: PublishState) {
        debug!(state = %next, "publish state transition");
        *self.state.lock().expect("publish state poisoned") = next;
    }

    /// Publish the archive under `destination_root`.
    ///
    /// Fails without touching the control file if any chunk cannot be
    /// uploaded, so a reader listing the destination mid-publish or
    /// after a failure never finds a control file over incomplete data.
    pub async fn publish(
        &self,
        chunk_set: &ChunkSet,
        destination_root: &str,
    ) -> PublishResult<PublishReport> {
        self.publish_with_progress(chunk_set, destination_root, None)
            .await
    }

    /// As [`PublishEngine::publish`], ticking a progress bar per chunk.
    pub async fn publish_with_progress(
        &self,
        chunk_set: &ChunkSet,
        destination_root: &str,
        progress: Option<&ProgressBar>,
    ) -> PublishResult<PublishReport> {
        let destination_root = destination_root.trim_end_matches('/');
        info!(
            chunks = chunk_set.len(),
            bytes = chunk_set.total_bytes(),
            destination_root,
            "starting publish"
        );

        // Phase one: all chunks, any order, bounded concurrency
        self.set_state(PublishState::UploadingChunks);
        let failed: Vec<(String, String)> =
            stream::iter(chunk_set.chunks().iter().map(|chunk| {
                let sink = Arc::clone(&self.sink);
                let uri = format!("{}/{}", destination_root, chunk.relative_path);
                async move {
                    let result = upload_with_retry(
                        sink.as_ref(),
                        &uri,
                        &chunk.absolute_path,
                        self.config.max_retries,
                        self.config.attempt_timeout,
                    )
                    .await;
                    if let Some(bar) = progress {
                        bar.inc(1);
                    }
                    result.err().map(|e| (chunk.relative_path.clone(), e))
                }
            }))
            .buffer_unordered(self.config.concurrency.max(1))
            .filter_map(|failure| async move { failure })
            .collect()
            .await;

        if !failed.is_empty() {
            self.set_state(PublishState::ChunksFailed);
            warn!(
                failed = failed.len(),
                "chunk uploads failed, withholding control file"
            );
            return Err(PublishError::ChunksFailed { failed });
        }
        self.set_state(PublishState::ChunksComplete);

        // Phase two: the control file, only now that every chunk landed
        self.set_state(PublishState::UploadingControl);
        let control = chunk_set.control();
        let control_uri = format!("{}/{}", destination_root, control.relative_path);
        if let Err(reason) = upload_with_retry(
            self.sink.as_ref(),
            &control_uri,
            &control.absolute_path,
            self.config.max_retries,
            self.config.attempt_timeout,
        )
        .await
        {
            self.set_state(PublishState::ControlFailed);
            return Err(PublishError::ControlFailed {
                name: control.relative_path.clone(),
                reason,
            });
        }
        self.set_state(PublishState::Published);
        if let Some(bar) = progress {
            bar.inc(1);
        }
        info!(control_uri, "control file published, archive is live");

        let verified = if self.config.verify {
            if let Err(e) = self.verify(chunk_set, destination_root).await {
                self.set_state(PublishState::VerifyFailed);
                return Err(e);
            }
            self.set_state(PublishState::Verified);
            true
        } else {
            false
        };

        Ok(PublishReport {
            chunks_published: chunk_set.len(),
            bytes_published: chunk_set.total_bytes(),
            control_uri,
            verified,
            state: self.state(),
        })
    }

    /// Audit the destination listing against the chunk set.
    async fn verify(&self, chunk_set: &ChunkSet, destination_root: &str) -> PublishResult<()> {
        let listed = self.sink.list(destination_root).await?;
        let missing: Vec<String> = chunk_set
            .chunks()
            .iter()
            .chain(std::iter::once(chunk_set.control()))
            .map(|f| format!("{}/{}", destination_root, f.relative_path))
            .filter(|uri| !listed.contains(uri))
            .collect();

        if missing.is_empty() {
            debug!(
                objects = chunk_set.len() + 1,
                "destination listing matches chunk set"
            );
            Ok(())
        } else {
            Err(PublishError::Integrity { missing })
        }
    }
}

/// Upload one file, retrying with capped exponential backoff and jitter.
///
/// Returns the failure as a string so callers can aggregate per-chunk
/// errors without losing the batch.
async fn upload_with_retry<S: ObjectSink>(
    sink: &S,
    uri: &str,
    path: &Path,
    max_retries: u32,
    attempt_timeout: Duration,
) -> Result<(), String> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => Bytes::from(data),
        Err(e) => return Err(format!("read {}: {}", path.display(), e)),
    };

    let mut attempt = 0;
    loop {
        let result = tokio::time::timeout(attempt_timeout, sink.put(uri, data.clone())).await;
        let error = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("attempt timed out after {:?}", attempt_timeout),
        };

        if attempt >= max_retries {
            return Err(error);
        }
        let delay = backoff_delay(attempt);
        debug!(uri, attempt, ?delay, error, "upload attempt failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// `base * 2^attempt`, capped, with +/- jitter to avoid thundering herds.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = limits::RETRY_BASE_DELAY.as_secs_f64() * 2f64.powi(attempt as i32);
    let capped = exp.min(limits::MAX_BACKOFF.as_secs_f64());
    let jitter = 1.0 + (fastrand::f64() * 2.0 - 1.0) * limits::BACKOFF_JITTER_FACTOR;
    Duration::from_secs_f64((capped * jitter).max(0.0))
}
