//! Error types for hls-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Manifest, Assembly, Config, etc.)
//! - A clear split between batch-fatal errors (config, auth, disk space)
//!   and item-scoped errors (manifest, segment, assembly, verification)
//! - Context information (segment index, file path, item id, etc.)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hls-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hls-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// Missing or malformed credentials (header file, authorization scheme)
    #[error("auth error: {0}")]
    Auth(String),

    /// Manifest-related error (unreachable, unparseable, empty, no suitable tier)
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// A single segment exhausted its retry budget
    #[error("segment {index} failed after {attempts} attempts: {reason}")]
    Segment {
        /// 0-based index of the failing segment
        index: usize,
        /// Number of attempts made before giving up
        attempts: u32,
        /// Last transport error observed
        reason: String,
    },

    /// Assembly error (concatenation or remux failure)
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Final output failed the integrity decode-check
    #[error("verification failed for {path}")]
    Verification {
        /// Path to the file that failed verification
        path: PathBuf,
    },

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (state file)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Item not found in the state store
    #[error("item not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new acquisitions
    #[error("shutdown in progress: not accepting new acquisitions")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Manifest resolution errors
///
/// All of these are fatal for the item being processed (surfaced, not retried
/// beyond the item's outer attempt budget). An empty variant or segment list is
/// indistinguishable from inaccessible content at this layer, so the two empty
/// cases carry the URI to make the report actionable.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Master manifest fetch returned a non-success status
    #[error("master manifest at {uri} returned HTTP {status}")]
    MasterUnavailable {
        /// The master manifest URI
        uri: String,
        /// HTTP status code returned
        status: u16,
    },

    /// Master/variant playlist could not be parsed
    #[error("failed to parse playlist at {uri}: {reason}")]
    ParseFailed {
        /// The playlist URI that failed to parse
        uri: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Master manifest parsed but contained no variants
    #[error("no variants found in master manifest at {uri}")]
    NoVariants {
        /// The master manifest URI
        uri: String,
    },

    /// Variant manifest parsed but contained no segments
    #[error("no segments found in variant manifest at {uri}")]
    NoSegments {
        /// The variant manifest URI
        uri: String,
    },

    /// No tier in the manifest matched the requested tier or any fallback
    #[error("no suitable tier: requested {requested}, available [{available}]")]
    NoSuitableTier {
        /// The tier that was requested
        requested: String,
        /// Comma-separated list of tiers present in the manifest
        available: String,
    },

    /// A URI in the playlist could not be resolved against its base
    #[error("failed to resolve URI '{uri}' against base '{base}': {reason}")]
    InvalidUri {
        /// The relative or malformed URI
        uri: String,
        /// The base URI used for resolution
        base: String,
        /// Parser diagnostic
        reason: String,
    },
}

/// Assembly errors (concatenation and remux)
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A segment file expected during concatenation is missing
    #[error("segment file missing during assembly: {path}")]
    SegmentMissing {
        /// The expected segment path
        path: PathBuf,
    },

    /// The concatenated intermediate file is missing or zero bytes
    #[error("intermediate file missing or empty: {path}")]
    EmptyIntermediate {
        /// Path to the intermediate container file
        path: PathBuf,
    },

    /// The remux subprocess exited with a failure
    #[error("remux failed for {output}: {stderr}")]
    RemuxFailed {
        /// Intended output path
        output: PathBuf,
        /// Captured stderr from the remux tool
        stderr: String,
    },
}
