//! Temporal re-visitation loop
//!
//! Growth snapshots re-fetch the metric subset for the exact id sets
//! frozen at harvest time, shifted forward by the configured interval per
//! generation. Each target timestamp is waited for with bounded-chunk
//! sleeps so a shutdown signal is observed promptly, then the same
//! enrichment fan-out runs over the fixed id list and the result is
//! persisted under the timestamp key.

use crate::config::Config;
use crate::crawler::enrich::{EnrichError, Enricher};
use crate::crawler::Shutdown;
use crate::platform::VideoApi;
use crate::state::{GrowthRecord, PassOutcome};
use crate::store::{parse_timestamp, SnapshotScope, SnapshotStore};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on one sleep chunk while waiting for a revisit instant
const WAIT_CHUNK: Duration = Duration::from_secs(60);

/// The growth-snapshot orchestrator
pub struct Revisitor<A: VideoApi> {
    config: Arc<Config>,
    store: Arc<SnapshotStore>,
    enricher: Enricher<A>,
    shutdown: Shutdown,
}

impl<A: VideoApi> Revisitor<A> {
    pub fn new(
        config: Arc<Config>,
        store: Arc<SnapshotStore>,
        enricher: Enricher<A>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            store,
            enricher,
            shutdown,
        }
    }

    /// Revisits every pending timestamp of one generation, in order
    pub async fn run(
        &self,
        generation: u32,
        pending: &BTreeMap<String, Vec<String>>,
    ) -> crate::Result<PassOutcome> {
        tracing::info!(
            "Growth snapshot {} of {}: {} timestamps pending",
            generation,
            self.config.crawler.max_generations,
            pending.len()
        );

        self.store.ensure_scope(SnapshotScope::Generation(generation))?;
        self.enricher.channel_cache().clear();

        for (timestamp, ids) in pending {
            if self.shutdown.is_triggered() {
                return Ok(PassOutcome::Interrupted);
            }

            let target = parse_timestamp(timestamp)
                .ok_or_else(|| crate::HarvestError::InvalidTimestamp(timestamp.clone()))?;

            if !self.wait_until(target).await {
                return Ok(PassOutcome::Interrupted);
            }

            tracing::info!(
                "Revisiting {} ({} records)",
                timestamp,
                ids.len()
            );

            // Partial data from an interrupted earlier run of this same
            // timestamp provides the comment carry-forward source
            let mut container = self
                .store
                .load_growth(generation, timestamp)?
                .unwrap_or_default();

            let enriched = self.enricher.enrich(ids, None).await;

            for video in &enriched.videos {
                let id = video.info.id.clone();
                let comments = if video.comments_failed {
                    let carried = container
                        .0
                        .get(&id)
                        .map(|prev| prev.comments.clone())
                        .unwrap_or_default();
                    if !carried.is_empty() {
                        tracing::info!(
                            "Preserving {} comments from prior snapshot for {}",
                            carried.len(),
                            id
                        );
                    }
                    carried
                } else {
                    video.comments.clone()
                };

                container.0.insert(
                    id,
                    GrowthRecord {
                        view_count: video.info.view_count.unwrap_or(0),
                        like_count: video.info.like_count.unwrap_or(0),
                        comment_count: video.info.comment_count.unwrap_or(0),
                        subscriber_count: video.channel.subscriber_count,
                        channel_video_count: video.channel.video_count,
                        channel_view_count: video.channel.view_count,
                        comments,
                    },
                );
            }

            if let Err(e) = self
                .store
                .save_growth(generation, timestamp, &container)
                .await
            {
                tracing::warn!("Failed to persist snapshot {}: {}", timestamp, e);
            }

            match &enriched.error {
                Some(EnrichError::QuotaExhausted) => {
                    return Ok(PassOutcome::QuotaExhausted);
                }
                Some(EnrichError::Failed(message)) => {
                    // Abandon this timestamp; the next run retries it
                    tracing::warn!(
                        "Timestamp {} left incomplete after error: {}",
                        timestamp,
                        message
                    );
                    continue;
                }
                None => {}
            }

            let mut ledger = self
                .store
                .load_progress(SnapshotScope::Generation(generation))?;
            ledger.mark(timestamp, true);
            if let Err(e) = self
                .store
                .save_progress(SnapshotScope::Generation(generation), &ledger)
                .await
            {
                tracing::warn!("Failed to persist snapshot ledger: {}", e);
            }

            tracing::info!(
                "Timestamp {} complete: {} of {} records captured",
                timestamp,
                container.len(),
                ids.len()
            );
        }

        Ok(PassOutcome::Completed)
    }

    /// Sleeps in bounded chunks until the target instant
    ///
    /// Returns false when a shutdown was observed while waiting.
    async fn wait_until(&self, target: chrono::DateTime<Utc>) -> bool {
        loop {
            if self.shutdown.is_triggered() {
                return false;
            }
            let now = Utc::now();
            if now >= target {
                return true;
            }

            let left = (target - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(WAIT_CHUNK);
            tracing::info!(
                "Waiting {}s until revisit instant {}",
                left.as_secs(),
                target.format("%Y-%m-%d %H:%M:%S")
            );
            tokio::time::sleep(left).await;
        }
    }
}

/// Shifts harvest discovery timestamps forward into revisit targets
///
/// Each sequence timestamp moves by `interval_days x generation`; the id
/// lists are carried unchanged (the set was fixed at harvest time).
pub fn build_target_map(
    sequence: &crate::store::SequenceLog,
    generation: u32,
    interval_days: i64,
) -> crate::Result<BTreeMap<String, Vec<String>>> {
    let shift = chrono::Duration::days(interval_days * generation as i64);
    let mut map = BTreeMap::new();

    for (timestamp, ids) in &sequence.0 {
        let at = parse_timestamp(timestamp)
            .ok_or_else(|| crate::HarvestError::InvalidTimestamp(timestamp.clone()))?;
        map.insert(crate::store::format_timestamp(at + shift), ids.clone());
    }

    Ok(map)
}
