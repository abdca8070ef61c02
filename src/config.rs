//! Configuration types for hls-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Tier;

/// Download behavior configuration (directories, concurrency, naming)
///
/// Groups settings related to how acquisitions are fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output directory for final files (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Temporary directory for segment files (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Default tier to request when the caller passes `best` (default: best)
    #[serde(default = "default_tier")]
    pub default_tier: Tier,

    /// Maximum concurrent items (default: 1)
    ///
    /// Item-level processing is intentionally serialized by default so the
    /// external remux tool never competes with another item's network and
    /// disk activity. Raise at your own risk.
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,

    /// Segment fetch workers within one item (default: 4)
    #[serde(default = "default_segment_concurrency")]
    pub segment_concurrency: usize,

    /// Filename template (default: "{creator}_{date}_{id}")
    ///
    /// Recognized placeholders: `{creator}`, `{date}`, `{id}`, `{number}`,
    /// `{letter}`.
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Fixed sequence number substituted for `{number}` (default: "1")
    #[serde(default = "default_sequence_number")]
    pub sequence_number: String,

    /// Fixed sequence letters substituted for `{letter}` (default: "A")
    #[serde(default = "default_sequence_letter")]
    pub sequence_letter: String,

    /// Minimum free disk space required before starting an item, in bytes
    /// (default: 1 GiB)
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
            default_tier: default_tier(),
            max_concurrent_items: default_max_concurrent_items(),
            segment_concurrency: default_segment_concurrency(),
            filename_template: default_filename_template(),
            sequence_number: default_sequence_number(),
            sequence_letter: default_sequence_letter(),
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

/// Credential configuration (request headers loaded from a collaborator file)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path to the header file (default: "./header.txt")
    ///
    /// The file contains one `Key: Value` pair per line and must include an
    /// `Authorization` header beginning with the expected scheme prefix.
    #[serde(default = "default_headers_file")]
    pub headers_file: PathBuf,

    /// Required prefix of the authorization value (default: "Token token=")
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            headers_file: default_headers_file(),
            auth_scheme: default_auth_scheme(),
        }
    }
}

/// External tool paths (ffmpeg)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set
    /// (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Maximum wall-clock time for one remux or verify subprocess
    /// (default: 900 seconds)
    #[serde(default = "default_tool_timeout", with = "duration_serde")]
    pub tool_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
            tool_timeout: default_tool_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    ///
    /// Set to 1.0 for a fixed inter-attempt delay.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Failure policy configuration
///
/// Segment-level and item-level budgets are distinct counters: a segment
/// exhausting [`FailurePolicyConfig::segment_retry`] aborts the current item
/// attempt, which in turn counts against `item_attempts`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailurePolicyConfig {
    /// Retry budget for a single segment fetch
    #[serde(default)]
    pub segment_retry: RetryConfig,

    /// Whole-item attempts from manifest refetch through remux (default: 3)
    #[serde(default = "default_item_attempts")]
    pub item_attempts: u32,

    /// Fixed delay between whole-item attempts (default: 5 seconds)
    #[serde(default = "default_item_retry_delay", with = "duration_serde")]
    pub item_retry_delay: Duration,

    /// Timeout for manifest fetches (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub manifest_timeout: Duration,

    /// Timeout for a single segment request (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub segment_timeout: Duration,
}

impl Default for FailurePolicyConfig {
    fn default() -> Self {
        Self {
            segment_retry: RetryConfig::default(),
            item_attempts: default_item_attempts(),
            item_retry_delay: default_item_retry_delay(),
            manifest_timeout: default_fetch_timeout(),
            segment_timeout: default_fetch_timeout(),
        }
    }
}

/// State persistence configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the state record file (default: "./acquisition_state.json")
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

/// Main configuration for [`MediaAcquirer`](crate::MediaAcquirer)
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) — directories, concurrency, naming
/// - [`auth`](AuthConfig) — header file and authorization scheme
/// - [`tools`](ToolsConfig) — ffmpeg path and subprocess timeout
/// - [`failure`](FailurePolicyConfig) — retry budgets and timeouts
/// - [`persistence`](PersistenceConfig) — state file location
///
/// All sub-config fields are flattened for backward-compatible
/// serialization, meaning the JSON format remains flat (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Credential settings
    #[serde(flatten)]
    pub auth: AuthConfig,

    /// External tool settings
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Retry budgets and timeouts
    #[serde(flatten)]
    pub failure: FailurePolicyConfig,

    /// State persistence settings
    #[serde(flatten)]
    pub persistence: PersistenceConfig,
}

// Convenience accessors — allow call sites to use `config.output_dir()` etc.
// without reaching through the sub-config structs.
impl Config {
    /// Output directory for final files
    pub fn output_dir(&self) -> &PathBuf {
        &self.download.output_dir
    }

    /// Temporary directory for segment files
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Validate settings that must hold before any work starts
    ///
    /// Fail-fast checks per the startup policy: an invalid configuration is
    /// fatal and never retried.
    pub fn validate(&self) -> Result<()> {
        if self.download.segment_concurrency == 0 {
            return Err(Error::Config {
                message: "segment_concurrency must be at least 1".to_string(),
                key: Some("segment_concurrency".to_string()),
            });
        }
        if self.download.max_concurrent_items == 0 {
            return Err(Error::Config {
                message: "max_concurrent_items must be at least 1".to_string(),
                key: Some("max_concurrent_items".to_string()),
            });
        }
        if self.download.filename_template.trim().is_empty() {
            return Err(Error::Config {
                message: "filename_template must not be empty".to_string(),
                key: Some("filename_template".to_string()),
            });
        }
        if self.failure.item_attempts == 0 {
            return Err(Error::Config {
                message: "item_attempts must be at least 1".to_string(),
                key: Some("item_attempts".to_string()),
            });
        }
        Ok(())
    }
}

// Default value functions for serde

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_tier() -> Tier {
    Tier::Best
}

fn default_max_concurrent_items() -> usize {
    1
}

fn default_segment_concurrency() -> usize {
    4
}

fn default_filename_template() -> String {
    "{creator}_{date}_{id}".to_string()
}

fn default_sequence_number() -> String {
    "1".to_string()
}

fn default_sequence_letter() -> String {
    "A".to_string()
}

fn default_min_free_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_headers_file() -> PathBuf {
    PathBuf::from("./header.txt")
}

fn default_auth_scheme() -> String {
    "Token token=".to_string()
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(900)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_item_attempts() -> u32 {
    3
}

fn default_item_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./acquisition_state.json")
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (seconds as integers)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
