//! Segment-level retrieval with resume and bounded concurrency
//!
//! Each segment lands in the item's temp directory as `segment_NNNNN.ts`.
//! Bodies stream into a `.part` file that is renamed only once fully written,
//! so any file with the final name and a non-zero size is trustworthy and is
//! reused on the next run without touching the network.

use crate::config::FailurePolicyConfig;
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Final on-disk name for a segment index
pub fn segment_file_name(index: usize) -> String {
    format!("segment_{index:05}.ts")
}

/// Downloads the segments of one item into its temp directory
pub struct SegmentFetcher {
    client: Client,
    policy: FailurePolicyConfig,
    concurrency: usize,
}

impl SegmentFetcher {
    /// Create a fetcher with the given per-segment retry/timeout policy
    pub fn new(client: Client, policy: FailurePolicyConfig, concurrency: usize) -> Self {
        Self {
            client,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every segment, reusing complete files from earlier runs
    ///
    /// Returns the ordered paths of all segment files on success. `progress`
    /// is called with `(downloaded, total)` each time a segment becomes
    /// available, counting reused files. On failure or cancellation the
    /// segments already on disk are left in place for the next attempt.
    pub async fn fetch_all(
        &self,
        segments: &[Url],
        temp_dir: &Path,
        cancel: &CancellationToken,
        progress: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(temp_dir).await?;

        let total = segments.len();
        let done = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(progress);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut paths = Vec::with_capacity(total);

        for (index, url) in segments.iter().enumerate() {
            let path = temp_dir.join(segment_file_name(index));
            paths.push(path.clone());

            if is_complete(&path).await {
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress(n, total);
                continue;
            }

            if cancel.is_cancelled() {
                return Err(Error::ShuttingDown);
            }

            let client = self.client.clone();
            let policy = self.policy.clone();
            let url = url.clone();
            let cancel = cancel.clone();
            let semaphore = Arc::clone(&semaphore);
            let done = Arc::clone(&done);
            let progress = Arc::clone(&progress);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| Error::ShuttingDown)?;
                if cancel.is_cancelled() {
                    return Err(Error::ShuttingDown);
                }

                fetch_one(&client, &policy, index, &url, &path).await?;
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress(n, total);
                Ok(())
            });
        }

        // First hard failure wins; siblings already written stay on disk
        let mut first_error: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                        tasks.abort_all();
                    }
                }
                // Tasks reaped after abort_all land here
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(Error::Other(e.to_string()));
                        tasks.abort_all();
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(paths),
        }
    }
}

/// A segment file with the final name and a non-zero size is complete
async fn is_complete(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// Download one segment with per-segment retry, via a `.part` rename
async fn fetch_one(
    client: &Client,
    policy: &FailurePolicyConfig,
    index: usize,
    url: &Url,
    path: &Path,
) -> Result<()> {
    let attempts = policy.segment_retry.max_attempts + 1;
    retry_with_backoff(&policy.segment_retry, || download(client, policy, url, path))
        .await
        .map_err(|e| Error::Segment {
            index,
            attempts,
            reason: e.to_string(),
        })
}

async fn download(
    client: &Client,
    policy: &FailurePolicyConfig,
    url: &Url,
    path: &Path,
) -> Result<()> {
    let response = client
        .get(url.clone())
        .timeout(policy.segment_timeout)
        .send()
        .await?
        .error_for_status()?;

    let part = path.with_extension("ts.part");
    let mut file = tokio::fs::File::create(&part).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    if written == 0 {
        tokio::fs::remove_file(&part).await.ok();
        return Err(Error::Other(format!("empty segment body from {url}")));
    }

    tokio::fs::rename(&part, path).await?;
    Ok(())
}
