//! Category harvest loop
//!
//! Drives the initial discovery pass: for each incomplete category, search
//! queries are worked through in keyword order, results are deduplicated,
//! enriched, screened, bucketed by publish age, and persisted after every
//! query so a crash resumes mid-category. The search cursor follows the
//! oldest bucket still in need, focusing quota where the gap is largest.

use crate::config::Config;
use crate::crawler::enrich::{EnrichError, EnrichResult, EnrichedVideo, Enricher};
use crate::crawler::Shutdown;
use crate::filter::{AdaptiveFilter, AgeBucket, BucketTargets, Engagement};
use crate::platform::{call_with_rotation, CallError, CredentialPool, SearchRequest, VideoApi};
use crate::state::{PassOutcome, VideoRecord};
use crate::store::{DedupIndex, SequenceLog, SnapshotScope, SnapshotStore};
use crate::text::{merge_tags, strip_tags};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ids returned by a paginated search
struct SearchOutcome {
    ids: Vec<String>,
    /// Quota ran out mid-pagination; the pass must unwind
    exhausted: bool,
    /// An unrelated failure abandoned pagination; the attempt is retried
    failed: bool,
}

/// The initial-harvest orchestrator
pub struct Harvester<A: VideoApi> {
    config: Arc<Config>,
    store: Arc<SnapshotStore>,
    pool: Arc<CredentialPool<A>>,
    enricher: Enricher<A>,
    targets: BucketTargets,
    shutdown: Shutdown,
}

impl<A: VideoApi> Harvester<A> {
    pub fn new(
        config: Arc<Config>,
        store: Arc<SnapshotStore>,
        pool: Arc<CredentialPool<A>>,
        enricher: Enricher<A>,
        shutdown: Shutdown,
    ) -> Self {
        let targets = BucketTargets::new(config.buckets.clone());
        Self {
            config,
            store,
            pool,
            enricher,
            targets,
            shutdown,
        }
    }

    /// Runs the harvest over every incomplete category
    pub async fn run(
        &self,
        shortfalls: &BTreeMap<String, BTreeMap<AgeBucket, usize>>,
    ) -> crate::Result<PassOutcome> {
        let mut sequence = self.store.load_sequence()?;
        let mut dedup = DedupIndex::from_sequence(&sequence);
        tracing::info!(
            "Harvest pass: {} categories incomplete, {} ids already seen",
            shortfalls.len(),
            dedup.len()
        );

        let mut filter = AdaptiveFilter::new(self.config.filter.clone());

        for category in &self.config.categories {
            if !shortfalls.contains_key(&category.name) {
                continue;
            }
            if self.shutdown.is_triggered() {
                return Ok(PassOutcome::Interrupted);
            }

            let outcome = self
                .harvest_category(&category.name, &category.keywords, &mut filter, &mut sequence, &mut dedup)
                .await?;
            if outcome != PassOutcome::Completed {
                return Ok(outcome);
            }
        }

        Ok(PassOutcome::Completed)
    }

    /// Works one category until its buckets fill or its keywords run out
    async fn harvest_category(
        &self,
        name: &str,
        keywords: &[String],
        filter: &mut AdaptiveFilter,
        sequence: &mut SequenceLog,
        dedup: &mut DedupIndex,
    ) -> crate::Result<PassOutcome> {
        let mut container = self.store.load_category(name)?.unwrap_or_default();
        if container.completed {
            return Ok(PassOutcome::Completed);
        }

        // Thresholds are per-category: reset, then reseed from whatever
        // this category already persisted so a resumed run filters at the
        // level it had reached.
        filter.reset();
        filter.seed(container.records().map(|(_, record)| {
            (
                Engagement {
                    views: record.view_count,
                    likes: record.like_count,
                    comments: record.comment_count,
                },
                record.duration_secs,
            )
        }));
        self.enricher.channel_cache().clear();

        let mut remaining = self.targets.total_remaining(&container.bucket_counts());
        tracing::info!(
            "Category {}: {} records to source, thresholds {:?}",
            name,
            remaining,
            filter.thresholds()
        );

        let mut published_after = self
            .targets
            .published_after(&container.bucket_counts(), Utc::now());

        'queries: for query in keywords {
            if container.used_queries.contains(query) {
                tracing::debug!("Skipping used query: {}", query);
                continue;
            }
            if self.shutdown.is_triggered() {
                return Ok(PassOutcome::Interrupted);
            }
            if remaining == 0 {
                break;
            }

            let mut attempt = 0;
            while attempt < self.config.crawler.query_retries {
                attempt += 1;
                tracing::info!(
                    "Category {} | query \"{}\" (attempt {}) | published after {} | thresholds {:?}",
                    name,
                    query,
                    attempt,
                    published_after.format("%Y-%m-%dT%H:%M:%SZ"),
                    filter.thresholds()
                );

                let search = self.search_paginated(query, published_after, remaining).await;
                let fresh = dedup.filter_new(&search.ids);
                tracing::info!(
                    "Search returned {} ids, {} after dedup",
                    search.ids.len(),
                    fresh.len()
                );

                let enriched = self.enricher.enrich(&fresh, Some(&mut *filter)).await;

                // Persist whatever the fan-out produced before deciding
                // how the attempt ended
                let added = self.absorb(&mut container, &enriched);
                dedup_extend(dedup, &added);
                sequence.append(Utc::now(), &added);
                self.persist(name, &container, sequence).await;

                remaining = self.targets.total_remaining(&container.bucket_counts());
                published_after = self
                    .targets
                    .published_after(&container.bucket_counts(), Utc::now());
                tracing::info!(
                    "Category {}: +{} records this query, {} remaining",
                    name,
                    added.len(),
                    remaining
                );

                if remaining == 0 {
                    self.finish_category(name, &mut container).await?;
                    break 'queries;
                }

                if search.exhausted
                    || matches!(enriched.error, Some(EnrichError::QuotaExhausted))
                {
                    return Ok(PassOutcome::QuotaExhausted);
                }

                if search.failed || matches!(enriched.error, Some(EnrichError::Failed(_))) {
                    let detail = match &enriched.error {
                        Some(EnrichError::Failed(message)) => message.clone(),
                        _ => "search pagination failed".to_string(),
                    };
                    tracing::warn!(
                        "Category {} | query \"{}\" attempt {} failed: {}",
                        name,
                        query,
                        attempt,
                        detail
                    );
                    continue;
                }

                // The query ran to the end; record it as used
                container.used_queries.insert(query.clone());
                self.persist(name, &container, sequence).await;
                break;
            }
        }

        if !container.completed {
            tracing::warn!(
                "Category {}: keyword list exhausted with {} records still missing",
                name,
                remaining
            );
            self.finish_category(name, &mut container).await?;
        }

        Ok(PassOutcome::Completed)
    }

    /// Marks a category complete in its container and the ledger
    async fn finish_category(
        &self,
        name: &str,
        container: &mut crate::store::CategoryContainer,
    ) -> crate::Result<()> {
        container.completed = true;
        self.store.save_category(name, container).await?;

        let mut ledger = self.store.load_progress(SnapshotScope::Harvest)?;
        ledger.mark(name, true);
        self.store
            .save_progress(SnapshotScope::Harvest, &ledger)
            .await?;

        tracing::info!(
            "Category {} complete with {} records",
            name,
            container.total_records()
        );
        Ok(())
    }

    /// Buckets enriched videos into the container; returns admitted ids
    fn absorb(
        &self,
        container: &mut crate::store::CategoryContainer,
        enriched: &EnrichResult,
    ) -> Vec<String> {
        let now = Utc::now();
        let mut added = Vec::new();
        for video in &enriched.videos {
            if video.comments_failed {
                tracing::warn!(
                    "Dropping {}: comment fetch failed during harvest",
                    video.info.id
                );
                continue;
            }
            let bucket = AgeBucket::classify(video.info.published_at, now);
            let id = video.info.id.clone();
            if container.insert(bucket, id.clone(), build_record(video)) {
                added.push(id);
            }
        }
        added
    }

    /// Saves the container and sequence, logging (not propagating)
    /// persistence failures so in-memory progress survives to the next
    /// flush attempt
    async fn persist(
        &self,
        name: &str,
        container: &crate::store::CategoryContainer,
        sequence: &SequenceLog,
    ) {
        if let Err(e) = self.store.save_category(name, container).await {
            tracing::warn!("Failed to persist category {}: {}", name, e);
        }
        if let Err(e) = self.store.save_sequence(sequence) {
            tracing::warn!("Failed to persist sequence log: {}", e);
        }
    }

    /// Paginated search bounded by page count, with credential rotation
    ///
    /// Unrelated failures abandon pagination and return the pages
    /// collected so far; quota exhaustion is marked so the caller can
    /// unwind after persisting.
    async fn search_paginated(
        &self,
        query: &str,
        published_after: DateTime<Utc>,
        want: usize,
    ) -> SearchOutcome {
        let page_size = self
            .config
            .crawler
            .search_page_size
            .min(want.max(1) as u32)
            .max(1);
        let max_pages = self
            .config
            .crawler
            .search_max_pages
            .min((want as u32 / page_size) + 1);

        let mut cached = None;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        let mut quota_cost = 0u64;

        for _page in 0..max_pages {
            let request = SearchRequest {
                query: query.to_string(),
                published_after: Some(published_after),
                page_size,
                page_token: page_token.take(),
            };

            match call_with_rotation(&self.pool, &mut cached, |api| {
                let request = request.clone();
                async move { api.search_page(&request).await }
            })
            .await
            {
                Ok(page) => {
                    ids.extend(page.ids);
                    quota_cost += page.cost;
                    page_token = page.next_page_token;
                    if page_token.is_none() {
                        break;
                    }
                }
                Err(CallError::QuotaExhausted) => {
                    tracing::warn!("Search \"{}\" hit quota exhaustion mid-pagination", query);
                    return SearchOutcome {
                        ids,
                        exhausted: true,
                        failed: false,
                    };
                }
                Err(e) => {
                    tracing::warn!("Search \"{}\" page failed: {}", query, e);
                    return SearchOutcome {
                        ids,
                        exhausted: false,
                        failed: true,
                    };
                }
            }
        }

        tracing::debug!(
            "Search \"{}\": {} ids across pagination, {} quota units",
            query,
            ids.len(),
            quota_cost
        );
        SearchOutcome {
            ids,
            exhausted: false,
            failed: false,
        }
    }
}

fn dedup_extend(dedup: &mut DedupIndex, ids: &[String]) {
    for id in ids {
        dedup.admit(id);
    }
}

/// Builds the persisted record from a fully enriched video
fn build_record(video: &EnrichedVideo) -> VideoRecord {
    let info = &video.info;
    VideoRecord {
        title: strip_tags(&info.title),
        description: strip_tags(&info.description),
        tags: merge_tags(&info.tags, &info.title, &info.description),
        language: info.language.clone(),
        view_count: info.view_count.unwrap_or(0),
        like_count: info.like_count.unwrap_or(0),
        comment_count: info.comment_count.unwrap_or(0),
        made_for_kids: info.made_for_kids,
        duration_secs: info.duration_secs,
        published_at: info.published_at,
        channel_title: video.channel.title.clone(),
        subscriber_count: video.channel.subscriber_count,
        channel_video_count: video.channel.video_count,
        channel_view_count: video.channel.view_count,
        country: video.channel.country.clone(),
        comments: video.comments.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelInfo, VideoInfo};
    use chrono::TimeZone;

    #[test]
    fn test_build_record_cleans_text_and_merges_tags() {
        let video = EnrichedVideo {
            info: VideoInfo {
                id: "a".to_string(),
                title: "My song #music".to_string(),
                description: "Listen now #new #Music".to_string(),
                tags: vec!["Official".to_string()],
                channel_id: "ch".to_string(),
                channel_title: "Channel".to_string(),
                published_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
                language: Some("en".to_string()),
                view_count: Some(100),
                like_count: Some(10),
                comment_count: Some(1),
                made_for_kids: false,
                duration_secs: Some(58),
            },
            channel: ChannelInfo {
                title: "Channel".to_string(),
                subscriber_count: Some(5),
                video_count: Some(2),
                view_count: Some(500),
                country: "US".to_string(),
            },
            comments: vec![],
            comments_failed: false,
        };

        let record = build_record(&video);
        assert_eq!(record.title, "My song");
        assert_eq!(record.description, "Listen now");
        assert_eq!(
            record.tags,
            vec![
                "Official".to_string(),
                "music".to_string(),
                "new".to_string()
            ]
        );
        assert_eq!(record.view_count, 100);
        assert_eq!(record.country, "US");
    }
}
