//! # hls-dl
//!
//! Resumable HLS acquisition engine: fetches adaptive-bitrate video referenced
//! by a remote master manifest and reassembles it into a single playable MP4.
//!
//! ## Design Philosophy
//!
//! hls-dl is designed to be:
//! - **Resumable** - segment-level resume across network failures and restarts
//! - **Idempotent** - completed items cost nothing on a rerun
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers read a FIFO event stream, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use hls_dl::{Config, MediaAcquirer, AcquisitionOptions, Event, ItemId, ItemMetadata};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let acquirer = MediaAcquirer::new(config).await?;
//!
//!     let items = vec![ItemMetadata {
//!         id: ItemId::new("post-123"),
//!         manifest_url: "https://cdn.example.com/post-123/master.m3u8".to_string(),
//!         creator: Some("alice".to_string()),
//!         published_date: Some("2024-06-01".to_string()),
//!         free: true,
//!         subscribed: false,
//!     }];
//!
//!     let mut events = acquirer.start_acquisition(items, AcquisitionOptions::default())?;
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Done => break,
//!             other => println!("{other:?}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Acquisition orchestrator (decomposed into focused submodules)
pub mod acquirer;
/// Lossless reassembly and integrity verification
pub mod assemble;
/// Session header loading and validation
pub mod auth;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Segment-level retrieval with resume
pub mod fetch;
/// Master and variant manifest resolution
pub mod manifest;
/// Collision-safe output filename generation
pub mod naming;
/// Quality tier selection
pub mod quality;
/// Retry logic with exponential backoff
pub mod retry;
/// Durable acquisition state
pub mod state;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use acquirer::MediaAcquirer;
pub use assemble::{FfmpegTool, MediaTool};
pub use config::{
    AuthConfig, Config, DownloadConfig, FailurePolicyConfig, PersistenceConfig, RetryConfig,
    ToolsConfig,
};
pub use error::{AssemblyError, Error, ManifestError, Result};
pub use manifest::{ManifestResolver, MasterManifest, Variant};
pub use naming::FilenameGenerator;
pub use quality::select_tier;
pub use state::StateStore;
pub use types::{
    AcquisitionItem, AcquisitionOptions, Event, ItemId, ItemMetadata, Status, Tier,
};

/// Helper function to run the acquirer with graceful signal handling.
///
/// Waits for a termination signal and then calls the acquirer's `stop()`
/// method, letting the current batch wind down at its next checkpoint.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use hls_dl::{Config, MediaAcquirer, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let acquirer = MediaAcquirer::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(acquirer).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(acquirer: MediaAcquirer) -> Result<()> {
    wait_for_signal().await;
    acquirer.stop();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
