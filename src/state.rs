//! Durable acquisition state persisted as a single JSON record file
//!
//! The store holds per-item snapshots plus a completed set and a failed map.
//! Every mutation rewrites the whole file atomically (serialize, write to a
//! temp file, rename into place) — not an append log. Reads take a shared
//! lock so status queries never wait behind the single writer.
//!
//! On load, items recorded as `in_progress` are reclassified to `incomplete`:
//! they were in flight when the process last stopped, and segment-level
//! resume applies on the next attempt.

use crate::error::Result;
use crate::types::{AcquisitionItem, ItemId, Status, Tier};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// On-disk schema of the state record file
///
/// `completed` membership is authoritative for skip-on-rerun decisions and is
/// only ever set after the integrity verifier succeeds. An id appears in at
/// most one of the in-progress, completed, and failed views at a time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StateFile {
    /// Per-item snapshots, including historical terminal records
    #[serde(default)]
    items: BTreeMap<ItemId, AcquisitionItem>,

    /// Ids whose output has been assembled and verified
    #[serde(default)]
    completed: BTreeSet<ItemId>,

    /// Id → last error for terminally failed items
    #[serde(default)]
    failed: BTreeMap<ItemId, String>,
}

/// Durable record of per-item acquisition status
///
/// One writer at a time mutates the store (the orchestrator worker owning the
/// item); concurrent readers are not blocked between mutations.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    inner: RwLock<StateFile>,
}

impl StateStore {
    /// Open the store, loading any existing record file
    ///
    /// A missing file yields an empty store. Items left `in_progress` by a
    /// previous process are reclassified to `incomplete` and the file is
    /// rewritten so the restart detection is itself durable.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StateFile>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(e) => return Err(e.into()),
        };

        let mut reclassified = 0usize;
        for item in state.items.values_mut() {
            if item.status == Status::InProgress {
                item.status = Status::Incomplete;
                item.updated_at = Utc::now();
                reclassified += 1;
            }
        }

        let store = Self {
            path,
            inner: RwLock::new(state),
        };

        if reclassified > 0 {
            tracing::info!(
                count = reclassified,
                "Reclassified interrupted items to incomplete"
            );
            let guard = store.inner.read().await;
            store.persist(&guard).await?;
        }

        Ok(store)
    }

    /// Path of the backing record file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that processing of an item has started
    ///
    /// Creates the snapshot if the id is new, transitions it to
    /// `in_progress`, and clears any previous failure record so the id lives
    /// in exactly one view.
    pub async fn begin_item(&self, id: &ItemId, requested_tier: Tier) -> Result<()> {
        let mut guard = self.inner.write().await;
        let now = Utc::now();
        let item = guard
            .items
            .entry(id.clone())
            .or_insert_with(|| AcquisitionItem::new(id.clone(), requested_tier));
        item.requested_tier = requested_tier;
        item.status = Status::InProgress;
        item.last_error = None;
        item.updated_at = now;
        guard.failed.remove(id);
        self.persist(&guard).await
    }

    /// Record the concrete tier the quality selector resolved to
    pub async fn set_resolved_tier(&self, id: &ItemId, tier: Tier) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(item) = guard.items.get_mut(id) {
            item.resolved_tier = Some(tier);
            item.updated_at = Utc::now();
        }
        self.persist(&guard).await
    }

    /// Update segment progress counters for an in-flight item
    pub async fn update_progress(&self, id: &ItemId, downloaded: usize, total: usize) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(item) = guard.items.get_mut(id) {
            item.segments_downloaded = downloaded;
            item.segments_total = total;
            item.updated_at = Utc::now();
        }
        self.persist(&guard).await
    }

    /// Mark an item completed
    ///
    /// Must only be called after the integrity verifier has succeeded;
    /// completed-set membership is what makes reruns skip the item.
    pub async fn mark_completed(&self, id: &ItemId) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(item) = guard.items.get_mut(id) {
            item.status = Status::Completed;
            item.last_error = None;
            item.updated_at = Utc::now();
        }
        guard.completed.insert(id.clone());
        guard.failed.remove(id);
        self.persist(&guard).await
    }

    /// Mark an item terminally failed with its last error
    ///
    /// Items can fail before processing ever begins (access and source
    /// pre-checks), so a snapshot is created when none exists yet: every id
    /// in the failed map stays queryable through [`snapshot`](Self::snapshot).
    pub async fn mark_failed(&self, id: &ItemId, error: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        let item = guard
            .items
            .entry(id.clone())
            .or_insert_with(|| AcquisitionItem::new(id.clone(), Tier::Best));
        item.status = Status::Failed;
        item.last_error = Some(error.to_string());
        item.updated_at = Utc::now();
        guard.failed.insert(id.clone(), error.to_string());
        guard.completed.remove(id);
        self.persist(&guard).await
    }

    /// O(1) check whether an item is already completed
    pub async fn is_completed(&self, id: &ItemId) -> bool {
        self.inner.read().await.completed.contains(id)
    }

    /// Read-only snapshot of one item's record
    pub async fn snapshot(&self, id: &ItemId) -> Option<AcquisitionItem> {
        self.inner.read().await.items.get(id).cloned()
    }

    /// Ids of items detected as interrupted on the last run
    pub async fn incomplete_ids(&self) -> Vec<ItemId> {
        self.inner
            .read()
            .await
            .items
            .values()
            .filter(|item| item.status == Status::Incomplete)
            .map(|item| item.id.clone())
            .collect()
    }

    /// Snapshot of the completed set
    pub async fn completed_ids(&self) -> BTreeSet<ItemId> {
        self.inner.read().await.completed.clone()
    }

    /// Snapshot of the failed map (id → last error)
    pub async fn failed_items(&self) -> BTreeMap<ItemId, String> {
        self.inner.read().await.failed.clone()
    }

    /// Atomically rewrite the record file from the given state
    async fn persist(&self, state: &StateFile) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
