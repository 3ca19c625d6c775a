//! Enrichment fan-out
//!
//! Candidate ids are processed in platform-page-sized batches: one batched
//! basic-info call, an immediate filter pass so quota is not spent on
//! records that will be discarded, then parallel per-video channel and
//! comment lookups on a bounded worker pool. Results are joined by id; a
//! record missing from any result set is dropped wholesale so persisted
//! records always carry complete data.

use crate::crawler::channel_cache::ChannelCache;
use crate::filter::{AdaptiveFilter, Engagement};
use crate::platform::{
    call_with_rotation, CallError, ChannelInfo, CredentialPool, VideoApi, VideoInfo,
};
use crate::state::Comment;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Batch size for the batched basic-info lookup (platform page size)
const BATCH_SIZE: usize = 50;

/// A record that survived the full fan-out
#[derive(Debug, Clone)]
pub struct EnrichedVideo {
    pub info: VideoInfo,
    pub channel: ChannelInfo,
    pub comments: Vec<Comment>,
    /// True when the comment fetch failed transiently; the revisit loop
    /// substitutes the prior snapshot's comments, the harvest drops the
    /// record
    pub comments_failed: bool,
}

/// Why an enrichment run stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichError {
    /// Every credential is spent; the collected videos cover only the
    /// batches that completed
    QuotaExhausted,

    /// An unrelated failure; counts against the caller's retry budget
    Failed(String),
}

/// Outcome of enriching one id list
#[derive(Debug, Default)]
pub struct EnrichResult {
    pub videos: Vec<EnrichedVideo>,
    /// Set when the run stopped before processing every batch
    pub error: Option<EnrichError>,
}

/// The engagement counters, when the platform reported all three
fn engagement_of(info: &VideoInfo) -> Option<Engagement> {
    Some(Engagement {
        views: info.view_count?,
        likes: info.like_count?,
        comments: info.comment_count?,
    })
}

/// Runs the per-batch fan-out against the platform API
pub struct Enricher<A> {
    pool: Arc<CredentialPool<A>>,
    channels: Arc<ChannelCache>,
    workers: usize,
    comment_limit: u32,
}

impl<A: VideoApi> Enricher<A> {
    pub fn new(
        pool: Arc<CredentialPool<A>>,
        channels: Arc<ChannelCache>,
        workers: usize,
        comment_limit: u32,
    ) -> Self {
        Self {
            pool,
            channels,
            workers,
            comment_limit,
        }
    }

    /// The shared channel cache (cleared at category boundaries)
    pub fn channel_cache(&self) -> &Arc<ChannelCache> {
        &self.channels
    }

    /// Enriches `ids`, screening through `filter` when harvesting
    ///
    /// A batch interrupted by quota exhaustion is discarded wholesale:
    /// none of its ids were persisted, so the restarted pass re-sources
    /// them idempotently.
    pub async fn enrich(
        &self,
        ids: &[String],
        mut filter: Option<&mut AdaptiveFilter>,
    ) -> EnrichResult {
        let mut result = EnrichResult::default();

        for batch in ids.chunks(BATCH_SIZE) {
            let mut cached = None;
            let batch_ids: Vec<String> = batch.to_vec();

            let infos = match call_with_rotation(&self.pool, &mut cached, |api| {
                let ids = batch_ids.clone();
                async move { api.video_details(&ids).await }
            })
            .await
            {
                Ok(infos) => infos,
                Err(CallError::QuotaExhausted) => {
                    result.error = Some(EnrichError::QuotaExhausted);
                    return result;
                }
                Err(CallError::Skipped { message, .. }) => {
                    tracing::warn!("Basic-info lookup skipped a batch: {}", message);
                    continue;
                }
                Err(CallError::Failed(e)) => {
                    result.error = Some(EnrichError::Failed(e.to_string()));
                    return result;
                }
            };

            // Filter before spending quota on further enrichment
            let mut candidates = Vec::new();
            for info in infos {
                let engagement = match engagement_of(&info) {
                    Some(e) => e,
                    None => continue,
                };
                if let Some(filter) = filter.as_deref_mut() {
                    if !filter.accepts(&engagement, info.duration_secs) {
                        continue;
                    }
                    filter.record_accepted(&engagement, info.duration_secs);
                }
                candidates.push(info);
            }
            if let Some(filter) = filter.as_deref_mut() {
                filter.maybe_recompute(false);
            }
            if candidates.is_empty() {
                tracing::debug!("Batch fully filtered, skipping channel/comment lookups");
                continue;
            }

            // One worker pool shared by the channel and comment stages
            let semaphore = Arc::new(Semaphore::new(self.workers));

            let (channel_map, exhausted) = self.fetch_channels(&candidates, &semaphore).await;
            if exhausted {
                result.error = Some(EnrichError::QuotaExhausted);
                return result;
            }

            let with_channel: Vec<&VideoInfo> = candidates
                .iter()
                .filter(|info| channel_map.contains_key(&info.id))
                .collect();

            let (comment_map, exhausted) = self.fetch_comments(&with_channel, &semaphore).await;
            if exhausted {
                result.error = Some(EnrichError::QuotaExhausted);
                return result;
            }

            // Join by id; anything incomplete is dropped
            let batch_total = candidates.len();
            let mut joined = 0;
            for info in candidates {
                let channel = match channel_map.get(&info.id) {
                    Some(channel) => channel.clone(),
                    None => continue,
                };
                let (comments, comments_failed) = match comment_map.get(&info.id) {
                    Some(entry) => entry.clone(),
                    None => continue,
                };
                joined += 1;
                result.videos.push(EnrichedVideo {
                    info,
                    channel,
                    comments,
                    comments_failed,
                });
            }
            if joined < batch_total {
                tracing::warn!(
                    "Dropped {} of {} candidates with incomplete enrichment",
                    batch_total - joined,
                    batch_total
                );
            }
        }

        result
    }

    /// Parallel channel lookups through the cache
    ///
    /// Returns the id-keyed channel map and whether quota ran out. Ids
    /// whose channel is missing or whose lookup failed are absent from
    /// the map.
    async fn fetch_channels(
        &self,
        candidates: &[VideoInfo],
        semaphore: &Arc<Semaphore>,
    ) -> (HashMap<String, ChannelInfo>, bool) {
        let mut join_set = JoinSet::new();

        for info in candidates {
            if info.channel_id.is_empty() {
                continue;
            }
            let pool = Arc::clone(&self.pool);
            let channels = Arc::clone(&self.channels);
            let semaphore = Arc::clone(semaphore);
            let video_id = info.id.clone();
            let channel_id = info.channel_id.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = channels
                    .get_or_fetch(&channel_id, || {
                        let pool = Arc::clone(&pool);
                        let channel_id = channel_id.clone();
                        async move {
                            let mut cached = None;
                            call_with_rotation(&pool, &mut cached, |api| {
                                let channel_id = channel_id.clone();
                                async move { api.channel_details(&channel_id).await }
                            })
                            .await
                            .or_else(|e| match e {
                                // A vanished channel is a tombstone, not an error
                                CallError::Skipped { .. } => Ok(None),
                                other => Err(other),
                            })
                        }
                    })
                    .await;
                (video_id, channel_id, outcome)
            });
        }

        let mut map = HashMap::new();
        let mut exhausted = false;
        while let Some(joined) = join_set.join_next().await {
            let (video_id, channel_id, outcome) = match joined {
                Ok(t) => t,
                Err(_) => continue,
            };
            match outcome {
                Ok(Some(channel)) => {
                    map.insert(video_id, channel);
                }
                Ok(None) => {
                    tracing::warn!(
                        "Dropping {}: channel {} not found",
                        video_id,
                        channel_id
                    );
                }
                Err(CallError::QuotaExhausted) => {
                    exhausted = true;
                    join_set.abort_all();
                }
                Err(e) => {
                    tracing::warn!(
                        "Dropping {}: channel {} lookup failed: {}",
                        video_id,
                        channel_id,
                        e
                    );
                }
            }
        }

        (map, exhausted)
    }

    /// Parallel top-comment lookups
    ///
    /// Comments-disabled and not-found lookups yield an empty list;
    /// transient failures yield an empty list with the failed marker set.
    async fn fetch_comments(
        &self,
        candidates: &[&VideoInfo],
        semaphore: &Arc<Semaphore>,
    ) -> (HashMap<String, (Vec<Comment>, bool)>, bool) {
        let mut join_set = JoinSet::new();

        for info in candidates {
            let pool = Arc::clone(&self.pool);
            let semaphore = Arc::clone(semaphore);
            let video_id = info.id.clone();
            let limit = self.comment_limit;

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let mut cached = None;
                let outcome = call_with_rotation(&pool, &mut cached, |api| {
                    let video_id = video_id.clone();
                    async move { api.top_comments(&video_id, limit).await }
                })
                .await;
                (video_id, outcome)
            });
        }

        let mut map = HashMap::new();
        let mut exhausted = false;
        while let Some(joined) = join_set.join_next().await {
            let (video_id, outcome) = match joined {
                Ok(t) => t,
                Err(_) => continue,
            };
            match outcome {
                Ok(comments) => {
                    map.insert(video_id, (comments, false));
                }
                Err(CallError::Skipped { message, .. }) => {
                    tracing::debug!("Comments unavailable for {}: {}", video_id, message);
                    map.insert(video_id, (Vec::new(), false));
                }
                Err(CallError::QuotaExhausted) => {
                    exhausted = true;
                    join_set.abort_all();
                }
                Err(CallError::Failed(e)) => {
                    tracing::warn!("Comment fetch failed for {}: {}", video_id, e);
                    map.insert(video_id, (Vec::new(), true));
                }
            }
        }

        (map, exhausted)
    }
}
