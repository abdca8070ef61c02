//! Acquisition orchestrator
//!
//! Drives the whole pipeline for a batch of items: completed-set skip, disk
//! pre-check, manifest resolution, tier selection, segment retrieval,
//! assembly, verification, and durable state transitions. Items are processed
//! one at a time; concurrency lives at the segment level.

mod worker;

use crate::assemble::{FfmpegTool, MediaTool};
use crate::auth;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::naming::FilenameGenerator;
use crate::state::StateStore;
use crate::types::{AcquisitionItem, AcquisitionOptions, Event, ItemId, ItemMetadata};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Buffer for the per-batch FIFO event channel
const EVENT_CHANNEL_SIZE: usize = 256;

/// Buffer for the broadcast mirror; slow subscribers lag, they don't block
const BROADCAST_CHANNEL_SIZE: usize = 1000;

/// Main acquisition engine (cloneable, all shared fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaAcquirer {
    /// Static configuration
    pub(crate) config: Arc<Config>,
    /// HTTP client carrying the session's default headers
    pub(crate) client: reqwest::Client,
    /// Durable per-item state
    pub(crate) state: Arc<StateStore>,
    /// External media tool for remux and decode-check
    pub(crate) tool: Arc<dyn MediaTool>,
    /// Collision-safe output filename generator
    pub(crate) naming: Arc<FilenameGenerator>,
    /// Broadcast mirror of all batch events (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Cooperative shutdown signal, checked between segments and items
    pub(crate) cancel: CancellationToken,
}

// `dyn MediaTool` carries no Debug bound; report the tool by name instead
impl std::fmt::Debug for MediaAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAcquirer")
            .field("config", &self.config)
            .field("tool", &self.tool.name())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl MediaAcquirer {
    /// Create an acquirer with ffmpeg resolved from the configuration
    ///
    /// Validates the configuration, loads the session headers, and opens the
    /// state record file (reclassifying any interrupted items).
    pub async fn new(config: Config) -> Result<Self> {
        let tool: Arc<dyn MediaTool> = Arc::new(FfmpegTool::from_config(&config.tools)?);
        Self::with_tool(config, tool).await
    }

    /// Create an acquirer with an injected media tool implementation
    pub async fn with_tool(config: Config, tool: Arc<dyn MediaTool>) -> Result<Self> {
        config.validate()?;
        let headers = auth::load_headers(&config.auth)?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        let state = StateStore::open(&config.persistence.state_path).await?;
        let naming = FilenameGenerator::new(&config.download);
        let (event_tx, _rx) = broadcast::channel(BROADCAST_CHANNEL_SIZE);

        tracing::info!(
            state = %config.persistence.state_path.display(),
            tool = tool.name(),
            "Acquirer initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            client,
            state: Arc::new(state),
            tool,
            naming: Arc::new(naming),
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Start acquiring a batch of items
    ///
    /// Returns the receiving end of the batch's FIFO event channel. Events
    /// arrive in emission order and the stream is terminated by exactly one
    /// [`Event::Done`], whatever happens to the individual items. The batch's
    /// requested tier, output directory, and segment concurrency come from
    /// `options`, falling back to the configuration. Item-level
    /// failures are reported as events; only configuration, authentication,
    /// and resource problems abort the batch early.
    pub fn start_acquisition(
        &self,
        items: Vec<ItemMetadata>,
        options: AcquisitionOptions,
    ) -> Result<mpsc::Receiver<Event>> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let acquirer = self.clone();
        tokio::spawn(async move {
            worker::run_batch(acquirer, items, options, tx).await;
        });
        Ok(rx)
    }

    /// Read-only snapshot of one item's durable record
    pub async fn query_status(&self, id: &ItemId) -> Option<AcquisitionItem> {
        self.state.snapshot(id).await
    }

    /// Subscribe to the broadcast mirror of acquisition events
    ///
    /// Each subscriber receives all events independently; subscribers that
    /// fall far behind miss the oldest events rather than applying
    /// backpressure. The per-batch channel from
    /// [`start_acquisition`](Self::start_acquisition) is the lossless stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Request a cooperative stop
    ///
    /// In-flight segment writes finish; the current batch winds down at the
    /// next checkpoint and still delivers its `Done` sentinel. Further
    /// `start_acquisition` calls are rejected with `ShuttingDown`.
    pub fn stop(&self) {
        tracing::info!("Stop requested");
        self.cancel.cancel();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct NoOpTool;

    #[async_trait]
    impl MediaTool for NoOpTool {
        async fn remux(&self, input: &Path, output: &Path) -> Result<()> {
            tokio::fs::copy(input, output).await?;
            Ok(())
        }

        async fn verify(&self, _file: &Path) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "noop"
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        let headers = dir.path().join("header.txt");
        std::fs::write(&headers, "Authorization: Token token=abc123\n").unwrap();
        let mut config = Config::default();
        config.auth.headers_file = headers;
        config.download.output_dir = dir.path().join("out");
        config.download.temp_dir = dir.path().join("tmp");
        config.download.min_free_bytes = 0;
        config.persistence.state_path = dir.path().join("state.json");
        config
    }

    async fn acquirer(dir: &TempDir) -> MediaAcquirer {
        MediaAcquirer::with_tool(test_config(dir), Arc::new(NoOpTool))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn query_status_for_unknown_item_is_none() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir).await;
        assert!(acq.query_status(&ItemId::new("ghost")).await.is_none());
    }

    #[tokio::test]
    async fn debug_output_names_the_injected_tool() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir).await;
        let rendered = format!("{acq:?}");
        assert!(rendered.contains("MediaAcquirer"), "got: {rendered}");
        assert!(rendered.contains("noop"), "got: {rendered}");
    }

    #[tokio::test]
    async fn start_after_stop_is_rejected() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir).await;
        acq.stop();
        let err = acq
            .start_acquisition(Vec::new(), AcquisitionOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }

    #[tokio::test]
    async fn empty_batch_yields_exactly_one_done() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir).await;
        let mut rx = acq
            .start_acquisition(Vec::new(), AcquisitionOptions::default())
            .unwrap();

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Done));
    }

    #[tokio::test]
    async fn missing_headers_file_fails_construction() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.auth.headers_file = PathBuf::from("/nonexistent/header.txt");
        let err = MediaAcquirer::with_tool(config, Arc::new(NoOpTool))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
