//! Per-batch processing loop
//!
//! One item at a time, each item given a bounded number of whole attempts
//! (manifest refetch, segment fetch, assemble, verify). The batch channel's
//! `Done` sentinel is sent exactly once, on every exit path.

use super::MediaAcquirer;
use crate::assemble;
use crate::error::{Error, Result};
use crate::fetch::SegmentFetcher;
use crate::manifest::ManifestResolver;
use crate::quality::select_tier;
use crate::types::{AcquisitionOptions, Event, ItemMetadata, Tier};
use crate::utils::ensure_free_space;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use url::Url;

/// Resolved per-batch settings
struct BatchSettings {
    output_dir: PathBuf,
    segment_concurrency: usize,
    requested_tier: Tier,
}

/// Process a whole batch and terminate the event stream with `Done`
pub(super) async fn run_batch(
    acq: MediaAcquirer,
    items: Vec<ItemMetadata>,
    options: AcquisitionOptions,
    tx: mpsc::Sender<Event>,
) {
    let settings = BatchSettings {
        output_dir: options
            .output_dir
            .unwrap_or_else(|| acq.config.download.output_dir.clone()),
        segment_concurrency: options
            .segment_concurrency
            .unwrap_or(acq.config.download.segment_concurrency),
        requested_tier: options.tier.unwrap_or(acq.config.download.default_tier),
    };

    tracing::info!(items = items.len(), "Batch started");

    if let Err(e) = tokio::fs::create_dir_all(&settings.output_dir).await {
        emit(
            &acq,
            &tx,
            Event::Message {
                text: format!("cannot create output directory: {e}"),
            },
        )
        .await;
        let _ = tx.send(Event::Done).await;
        return;
    }

    for meta in &items {
        if acq.cancel.is_cancelled() {
            emit(
                &acq,
                &tx,
                Event::Message {
                    text: "shutdown requested, stopping batch".to_string(),
                },
            )
            .await;
            break;
        }

        if let Err(e) = process_item(&acq, &tx, meta, &settings).await {
            // Only batch-fatal errors propagate this far
            tracing::error!(item_id = %meta.id, error = %e, "Aborting batch");
            emit(
                &acq,
                &tx,
                Event::Message {
                    text: format!("aborting batch: {e}"),
                },
            )
            .await;
            break;
        }
    }

    let _ = tx.send(Event::Done).await;
    tracing::info!("Batch finished");
}

/// Send an event on the batch channel and mirror it to broadcast subscribers
async fn emit(acq: &MediaAcquirer, tx: &mpsc::Sender<Event>, event: Event) {
    let _ = acq.event_tx.send(event.clone());
    let _ = tx.send(event).await;
}

/// True for errors that make continuing with the rest of the batch pointless
fn is_batch_fatal(error: &Error) -> bool {
    matches!(
        error,
        Error::Config { .. }
            | Error::Auth(_)
            | Error::InsufficientSpace { .. }
            | Error::DiskSpaceCheckFailed(_)
            | Error::ShuttingDown
    )
}

/// Run one item through skip, pre-checks, and the attempt loop
///
/// Item-level failures are recorded and emitted, then swallowed so the batch
/// moves on; the returned `Err` is reserved for batch-fatal conditions (and
/// for state-store writes failing, which make progress untrackable).
async fn process_item(
    acq: &MediaAcquirer,
    tx: &mpsc::Sender<Event>,
    meta: &ItemMetadata,
    settings: &BatchSettings,
) -> Result<()> {
    let id = &meta.id;

    // Idempotence: completed items cost nothing on a rerun
    if acq.state.is_completed(id).await {
        tracing::debug!(item_id = %id, "Already completed, skipping");
        emit(acq, tx, Event::Skipped { id: id.clone() }).await;
        return Ok(());
    }

    ensure_free_space(&settings.output_dir, acq.config.download.min_free_bytes)?;

    if !meta.free && !meta.subscribed {
        let reason = "item is not accessible with the current subscription";
        acq.state.mark_failed(id, reason).await?;
        emit(
            acq,
            tx,
            Event::Failed {
                id: id.clone(),
                error: reason.to_string(),
            },
        )
        .await;
        return Ok(());
    }

    let requested = settings.requested_tier;

    // An output left by a previous run counts as completed if it still
    // decodes cleanly; otherwise it is removed and rebuilt. A name claimed
    // by another item in this run belongs to that item, not this one.
    let base_name = acq.naming.base_name(meta);
    let existing = settings.output_dir.join(&base_name);
    if !acq.naming.is_reserved(&base_name) && tokio::fs::try_exists(&existing).await? {
        emit(acq, tx, Event::Verifying { id: id.clone() }).await;
        match acq.tool.verify(&existing).await {
            Ok(()) => {
                tracing::info!(item_id = %id, path = %existing.display(), "Existing output verified");
                acq.naming.reserve(&base_name);
                acq.state.begin_item(id, requested).await?;
                acq.state.mark_completed(id).await?;
                emit(
                    acq,
                    tx,
                    Event::Completed {
                        id: id.clone(),
                        path: existing,
                    },
                )
                .await;
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "Existing output failed verification, rebuilding");
                tokio::fs::remove_file(&existing).await?;
            }
        }
    }

    let manifest_url = match Url::parse(&meta.manifest_url) {
        Ok(url) => url,
        Err(e) => {
            let reason = format!("invalid manifest url {:?}: {e}", meta.manifest_url);
            acq.state.mark_failed(id, &reason).await?;
            emit(
                acq,
                tx,
                Event::Failed {
                    id: id.clone(),
                    error: reason,
                },
            )
            .await;
            return Ok(());
        }
    };

    // One cheap reachability probe per item, ahead of the attempt loop
    let resolver = ManifestResolver::new(acq.client.clone(), &acq.config.failure);
    if let Err(e) = resolver.validate_source(&manifest_url).await {
        let reason = format!("source pre-check failed: {e}");
        tracing::warn!(item_id = %id, error = %e, "Source pre-check failed");
        acq.state.mark_failed(id, &reason).await?;
        emit(
            acq,
            tx,
            Event::Failed {
                id: id.clone(),
                error: reason,
            },
        )
        .await;
        return Ok(());
    }

    acq.state.begin_item(id, requested).await?;
    emit(acq, tx, Event::Started { id: id.clone() }).await;

    let temp_dir = acq.config.download.temp_dir.join(id.as_str());
    let output_name = acq.naming.generate(meta, &settings.output_dir);
    let output_path = settings.output_dir.join(&output_name);

    let attempts = acq.config.failure.item_attempts;
    for attempt in 1..=attempts {
        if acq.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        match run_attempt(acq, tx, meta, &manifest_url, requested, &temp_dir, &output_path, settings)
            .await
        {
            Ok(()) => {
                acq.state.mark_completed(id).await?;
                emit(
                    acq,
                    tx,
                    Event::Completed {
                        id: id.clone(),
                        path: output_path.clone(),
                    },
                )
                .await;
                if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
                    tracing::warn!(item_id = %id, error = %e, "Temp cleanup failed");
                }
                tracing::info!(item_id = %id, path = %output_path.display(), "Item completed");
                return Ok(());
            }
            Err(e) if is_batch_fatal(&e) => return Err(e),
            Err(e) if attempt < attempts => {
                tracing::warn!(item_id = %id, attempt, error = %e, "Attempt failed, retrying");
                emit(
                    acq,
                    tx,
                    Event::AttemptFailed {
                        id: id.clone(),
                        attempt,
                        error: e.to_string(),
                    },
                )
                .await;
                tokio::select! {
                    _ = acq.cancel.cancelled() => return Err(Error::ShuttingDown),
                    _ = tokio::time::sleep(acq.config.failure.item_retry_delay) => {}
                }
            }
            Err(e) => {
                tracing::error!(item_id = %id, attempts, error = %e, "Item failed");
                acq.state.mark_failed(id, &e.to_string()).await?;
                emit(
                    acq,
                    tx,
                    Event::Failed {
                        id: id.clone(),
                        error: e.to_string(),
                    },
                )
                .await;
                return Ok(());
            }
        }
    }

    Ok(())
}

/// One whole attempt: resolve, select, fetch, assemble, verify
#[allow(clippy::too_many_arguments)]
async fn run_attempt(
    acq: &MediaAcquirer,
    tx: &mpsc::Sender<Event>,
    meta: &ItemMetadata,
    manifest_url: &Url,
    requested: Tier,
    temp_dir: &Path,
    output_path: &Path,
    settings: &BatchSettings,
) -> Result<()> {
    let id = &meta.id;
    let resolver = ManifestResolver::new(acq.client.clone(), &acq.config.failure);

    // Manifests are refetched on every attempt: segment URLs may be
    // short-lived signed links
    let master = resolver.resolve_master(manifest_url).await?;
    let tier = select_tier(requested, &master.available_tiers())?;
    acq.state.set_resolved_tier(id, tier).await?;
    emit(
        acq,
        tx,
        Event::TierSelected {
            id: id.clone(),
            tier,
        },
    )
    .await;

    let variant = master
        .variant_for(tier)
        .ok_or_else(|| Error::Other(format!("selected tier {tier} missing from manifest")))?;
    let segments = resolver.resolve_variant(variant).await?;
    acq.state.update_progress(id, 0, segments.len()).await?;

    let fetcher = SegmentFetcher::new(
        acq.client.clone(),
        acq.config.failure.clone(),
        settings.segment_concurrency,
    );

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(usize, usize)>();
    let fetch = fetcher.fetch_all(&segments, temp_dir, &acq.cancel, move |n, total| {
        let _ = progress_tx.send((n, total));
    });
    tokio::pin!(fetch);

    // Forward fetch progress to the event stream while the download runs.
    // Concurrent segment tasks can report out of order, so only the
    // high-water mark is emitted and the stream stays monotone.
    let mut reported = 0usize;
    let paths = loop {
        tokio::select! {
            result = &mut fetch => {
                while let Ok((downloaded, total)) = progress_rx.try_recv() {
                    if downloaded > reported {
                        reported = downloaded;
                        acq.state.update_progress(id, downloaded, total).await?;
                        emit(acq, tx, Event::SegmentProgress {
                            id: id.clone(),
                            downloaded,
                            total,
                        }).await;
                    }
                }
                break result?;
            }
            Some((downloaded, total)) = progress_rx.recv() => {
                if downloaded > reported {
                    reported = downloaded;
                    acq.state.update_progress(id, downloaded, total).await?;
                    emit(acq, tx, Event::SegmentProgress {
                        id: id.clone(),
                        downloaded,
                        total,
                    }).await;
                }
            }
        }
    };

    emit(acq, tx, Event::Assembling { id: id.clone() }).await;
    assemble::assemble(acq.tool.as_ref(), &paths, temp_dir, output_path).await?;

    emit(acq, tx, Event::Verifying { id: id.clone() }).await;
    if let Err(e) = acq.tool.verify(output_path).await {
        // Corrupt output invalidates the cached segments too; clearing them
        // forces the next attempt to refetch instead of reassembling the
        // same bad bytes
        tokio::fs::remove_file(output_path).await.ok();
        if let Err(cleanup) = tokio::fs::remove_dir_all(temp_dir).await {
            tracing::warn!(item_id = %id, error = %cleanup, "Segment cleanup after failed verify");
        }
        return Err(e);
    }

    Ok(())
}
