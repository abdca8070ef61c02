//! Core types and events for hls-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for an acquisition item
///
/// Items are keyed by an opaque string supplied by the catalog collaborator
/// (typically a post id). The engine never interprets the contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quality tier of a rendition
///
/// `Best` is a request-only pseudo-tier: it never appears in a manifest and is
/// resolved to a concrete tier by the quality selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Best available (resolved via the fallback priority order)
    Best,
    /// 1080p (Full HD)
    Fhd,
    /// 720p (HD)
    Hd,
    /// 480p (SD)
    Sd,
    /// 360p (LD)
    Ld,
}

impl Tier {
    /// Human-readable label matching the wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Best => "best",
            Tier::Fhd => "fhd",
            Tier::Hd => "hd",
            Tier::Sd => "sd",
            Tier::Ld => "ld",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acquisition status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Accepted but not yet started
    Pending,
    /// Currently being processed
    InProgress,
    /// Was in progress when the process last stopped (restart-detected);
    /// reclassified to InProgress on the next attempt with segment resume
    Incomplete,
    /// Verified and recorded in the completed set (terminal)
    Completed,
    /// Exhausted the item attempt budget (terminal; retried only by a new
    /// explicit request)
    Failed,
}

impl Status {
    /// True for the two terminal states
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

/// Snapshot of one acquisition item
///
/// Owned exclusively by the orchestrator while in flight; persisted by the
/// state store between runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquisitionItem {
    /// Item identifier
    pub id: ItemId,

    /// Tier that was requested (may be `best`)
    pub requested_tier: Tier,

    /// Concrete tier the quality selector resolved to (None until resolved)
    pub resolved_tier: Option<Tier>,

    /// Current status
    pub status: Status,

    /// Total number of segments in the chosen variant (0 until known)
    pub segments_total: usize,

    /// Number of segments present on disk so far
    pub segments_downloaded: usize,

    /// Last error recorded for this item (None if never failed)
    pub last_error: Option<String>,

    /// When processing first started
    pub started_at: DateTime<Utc>,

    /// When the record was last mutated
    pub updated_at: DateTime<Utc>,
}

impl AcquisitionItem {
    /// Create a fresh pending record for an accepted id
    pub fn new(id: ItemId, requested_tier: Tier) -> Self {
        let now = Utc::now();
        Self {
            id,
            requested_tier,
            resolved_tier: None,
            status: Status::Pending,
            segments_total: 0,
            segments_downloaded: 0,
            last_error: None,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Metadata about an item, supplied by the catalog collaborator
///
/// Used by the filename generator and by the access pre-checks. The engine
/// does not fetch catalogs itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Item identifier
    pub id: ItemId,

    /// Master manifest URI for the chosen source
    pub manifest_url: String,

    /// Creator handle (for the `{creator}` placeholder)
    #[serde(default)]
    pub creator: Option<String>,

    /// Publication date in `YYYY-MM-DD` form (for the `{date}` placeholder)
    #[serde(default)]
    pub published_date: Option<String>,

    /// Whether the item is freely accessible
    #[serde(default)]
    pub free: bool,

    /// Whether the caller holds a subscription covering the item
    #[serde(default)]
    pub subscribed: bool,
}

/// Options for a single acquisition batch
#[derive(Clone, Debug, Default)]
pub struct AcquisitionOptions {
    /// Quality tier to request for every item in this batch
    /// (falls back to the configured default tier)
    pub tier: Option<Tier>,

    /// Override the configured output directory for this batch
    pub output_dir: Option<PathBuf>,

    /// Override the configured intra-item segment worker count
    pub segment_concurrency: Option<usize>,
}

/// Event emitted during the acquisition lifecycle
///
/// Delivered in FIFO order over the per-batch channel; a batch is terminated
/// by exactly one [`Event::Done`] sentinel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item accepted and processing started
    Started {
        /// Item identifier
        id: ItemId,
    },

    /// Skipped because the item is already in the completed set
    Skipped {
        /// Item identifier
        id: ItemId,
    },

    /// Quality selector resolved the tier for this item
    TierSelected {
        /// Item identifier
        id: ItemId,
        /// Concrete tier chosen
        tier: Tier,
    },

    /// Segment download progress update
    SegmentProgress {
        /// Item identifier
        id: ItemId,
        /// Segments present on disk so far
        downloaded: usize,
        /// Total segments in the variant
        total: usize,
    },

    /// Concatenation and remux started
    Assembling {
        /// Item identifier
        id: ItemId,
    },

    /// Integrity decode-check started
    Verifying {
        /// Item identifier
        id: ItemId,
    },

    /// A whole-item attempt failed and will be retried after a delay
    AttemptFailed {
        /// Item identifier
        id: ItemId,
        /// Attempt number that just failed (1-based)
        attempt: u32,
        /// Error message
        error: String,
    },

    /// Item completed and verified
    Completed {
        /// Item identifier
        id: ItemId,
        /// Final output path
        path: PathBuf,
    },

    /// Item failed terminally (attempt budget exhausted or fatal item error)
    Failed {
        /// Item identifier
        id: ItemId,
        /// Error message
        error: String,
    },

    /// Free-form human-readable status line
    Message {
        /// The status text
        text: String,
    },

    /// End-of-batch sentinel; consumers must close their loop on this
    Done,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Fhd).unwrap(), "\"fhd\"");
        assert_eq!(serde_json::to_string(&Tier::Best).unwrap(), "\"best\"");
    }

    #[test]
    fn tier_round_trips_through_serde_for_all_variants() {
        for tier in [Tier::Best, Tier::Fhd, Tier::Hd, Tier::Sd, Tier::Ld] {
            let json = serde_json::to_string(&tier).unwrap();
            let back: Tier = serde_json::from_str(&json).unwrap();
            assert_eq!(back, tier, "{tier} should round-trip");
        }
    }

    #[test]
    fn tier_display_matches_wire_form() {
        assert_eq!(Tier::Hd.to_string(), "hd");
        assert_eq!(Tier::Ld.to_string(), "ld");
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&Status::Incomplete).unwrap(),
            "\"incomplete\""
        );
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::InProgress.is_terminal());
        assert!(!Status::Incomplete.is_terminal());
    }

    #[test]
    fn metadata_default_starts_empty() {
        let meta = ItemMetadata::default();
        assert_eq!(meta.id.as_str(), "");
        assert!(meta.manifest_url.is_empty());
        assert!(!meta.free && !meta.subscribed);
    }

    #[test]
    fn item_id_is_transparent_in_serde() {
        let id = ItemId::new("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
        let back: ItemId = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn new_acquisition_item_starts_pending_with_zero_progress() {
        let item = AcquisitionItem::new(ItemId::new("x"), Tier::Best);
        assert_eq!(item.status, Status::Pending);
        assert_eq!(item.segments_total, 0);
        assert_eq!(item.segments_downloaded, 0);
        assert!(item.resolved_tier.is_none());
        assert!(item.last_error.is_none());
    }

    #[test]
    fn event_tags_use_snake_case() {
        let json = serde_json::to_string(&Event::SegmentProgress {
            id: ItemId::new("p1"),
            downloaded: 3,
            total: 42,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"segment_progress\""), "got: {json}");

        let done = serde_json::to_string(&Event::Done).unwrap();
        assert_eq!(done, "{\"type\":\"done\"}");
    }
}
