//! Crawl orchestration
//!
//! The top-level driver selects a run from persisted state (resume the
//! harvest, or advance to the next growth-snapshot generation), executes
//! it, and reacts to its typed outcome: pass completion advances the
//! plan, quota exhaustion suspends until the daily reset and restarts the
//! same generation from credential index zero, and unexpected errors cool
//! down before the loop retries.

mod channel_cache;
mod enrich;
mod orchestrator;
mod revisit;

pub use channel_cache::ChannelCache;
pub use enrich::{EnrichError, EnrichResult, EnrichedVideo, Enricher};
pub use orchestrator::Harvester;
pub use revisit::{build_target_map, Revisitor};

use crate::config::{Config, QuotaConfig};
use crate::filter::BucketTargets;
use crate::platform::{CredentialPool, VideoApi, YoutubeClient};
use crate::state::{PassOutcome, RunPlan};
use crate::store::{MirrorSink, SnapshotScope, SnapshotStore};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Progress logging interval while waiting for quota reset
const QUOTA_WAIT_CHUNK: Duration = Duration::from_secs(600);

/// Cooperative process-level shutdown flag
///
/// Observed between queries, batches, and sleep chunks; never mid-task.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trips the flag on the first interrupt signal
    pub fn listen_for_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received, finishing current step");
                flag.trigger();
            }
        });
    }
}

/// Opens the snapshot store described by the configuration
pub fn open_store(config: &Config) -> crate::Result<SnapshotStore> {
    let sink = config
        .storage
        .mirror_dir
        .as_ref()
        .map(|dir| Arc::new(MirrorSink::new(dir)) as Arc<dyn crate::store::BlobSink>);

    Ok(SnapshotStore::new(
        &config.storage.results_dir,
        Duration::from_secs(config.storage.flush_cooldown_secs),
        sink,
    )?)
}

/// Selects the next run from persisted state
///
/// Completion is re-derived (and healed) for every category before the
/// decision, so a ledger corrupted by a prior run cannot skip real work
/// or re-crawl finished categories.
pub async fn plan_run(config: &Config, store: &SnapshotStore) -> crate::Result<RunPlan> {
    let targets = BucketTargets::new(config.buckets.clone());

    let mut shortfalls = BTreeMap::new();
    for category in &config.categories {
        let complete = store.recompute_completion(&category.name, &targets).await?;
        if !complete {
            shortfalls.insert(
                category.name.clone(),
                store.missing_work(&category.name, &targets)?,
            );
        }
    }
    if !shortfalls.is_empty() {
        return Ok(RunPlan::Harvest { shortfalls });
    }

    for generation in 1..=config.crawler.max_generations {
        let map = match store.load_target_map(generation)? {
            Some(map) => map,
            None => {
                // First visit to this generation: freeze the target map
                // from the discovery sequence
                let sequence = store.load_sequence()?;
                let map = build_target_map(
                    &sequence,
                    generation,
                    config.crawler.revisit_interval_days,
                )?;
                store.save_target_map(generation, &map)?;

                let mut ledger = store.load_progress(SnapshotScope::Generation(generation))?;
                for timestamp in map.keys() {
                    ledger.mark(timestamp, false);
                }
                store
                    .save_progress(SnapshotScope::Generation(generation), &ledger)
                    .await?;
                map
            }
        };

        let ledger = store.load_progress(SnapshotScope::Generation(generation))?;
        let pending: BTreeMap<String, Vec<String>> = map
            .into_iter()
            .filter(|(timestamp, ids)| !ids.is_empty() && !ledger.is_complete(timestamp))
            .collect();

        if !pending.is_empty() {
            return Ok(RunPlan::Revisit {
                generation,
                pending,
            });
        }
    }

    Ok(RunPlan::GloballyComplete)
}

/// Runs the crawl to global completion with the production API client
pub async fn run_crawl(config: Config, config_hash: &str, shutdown: Shutdown) -> crate::Result<()> {
    run_crawl_with(config, config_hash, shutdown, |key| YoutubeClient::new(key)).await
}

/// Driver loop, generic over the platform client factory
pub async fn run_crawl_with<A, F>(
    config: Config,
    config_hash: &str,
    shutdown: Shutdown,
    build_client: F,
) -> crate::Result<()>
where
    A: VideoApi,
    F: Fn(&str) -> A + Send + Sync + Clone + 'static,
{
    let config = Arc::new(config);
    let store = Arc::new(open_store(&config)?);

    if let Some(previous) = store.load_config_hash() {
        if previous.trim() != config_hash {
            tracing::warn!(
                "Configuration changed since the last run ({} -> {}); \
                 resumed state was collected under the old settings",
                previous.trim(),
                config_hash
            );
        }
    }
    if let Err(e) = store.record_config_hash(config_hash) {
        tracing::warn!("Failed to record config hash: {}", e);
    }

    loop {
        if shutdown.is_triggered() {
            tracing::info!("Shutdown requested, exiting");
            return Ok(());
        }

        let plan = plan_run(&config, &store).await?;

        // A fresh pool per pass: after a quota wait the rotation restarts
        // from credential index zero
        let pool = Arc::new(CredentialPool::new(
            config.credentials.api_keys.clone(),
            {
                let build_client = build_client.clone();
                move |key: &str| build_client(key)
            },
        ));
        let enricher = Enricher::new(
            Arc::clone(&pool),
            Arc::new(ChannelCache::new()),
            config.crawler.workers,
            config.crawler.comment_limit,
        );

        let outcome = match plan {
            RunPlan::GloballyComplete => {
                tracing::info!(
                    "All {} growth snapshots complete; crawl is globally complete",
                    config.crawler.max_generations
                );
                return Ok(());
            }
            RunPlan::Harvest { shortfalls } => {
                let harvester = Harvester::new(
                    Arc::clone(&config),
                    Arc::clone(&store),
                    pool,
                    enricher,
                    shutdown.clone(),
                );
                harvester.run(&shortfalls).await
            }
            RunPlan::Revisit {
                generation,
                pending,
            } => {
                let revisitor = Revisitor::new(
                    Arc::clone(&config),
                    Arc::clone(&store),
                    enricher,
                    shutdown.clone(),
                );
                revisitor.run(generation, &pending).await
            }
        };

        match outcome {
            Ok(PassOutcome::Completed) => {
                tracing::info!("Pass complete, advancing");
            }
            Ok(PassOutcome::Interrupted) => {
                tracing::info!("Pass interrupted by shutdown; progress persisted");
                return Ok(());
            }
            Ok(PassOutcome::QuotaExhausted) => {
                tracing::warn!("Quota exhausted; suspending until reset");
                wait_until_quota_reset(&config.quota, &shutdown).await;
            }
            Err(e) => {
                // Only truly unexpected failures land here; cool down and
                // let the loop retry the same plan
                tracing::error!("Pass failed unexpectedly: {}", e);
                sleep_with_shutdown(
                    Duration::from_secs(config.crawler.error_cooldown_secs),
                    &shutdown,
                )
                .await;
            }
        }
    }
}

/// The next daily reset instant after `now`
fn next_reset_instant(now: DateTime<Utc>, quota: &QuotaConfig) -> DateTime<Utc> {
    use chrono::Offset;

    let offset = FixedOffset::east_opt(quota.utc_offset_hours * 3600)
        .unwrap_or_else(|| Utc.fix());
    let local_now = now.with_timezone(&offset);

    // Hour and minute are range-checked at config load
    let today = match local_now
        .date_naive()
        .and_hms_opt(quota.reset_hour, quota.reset_minute, 0)
    {
        Some(at) => at,
        None => return now + chrono::Duration::days(1),
    };

    let candidate = match today.and_local_timezone(offset).earliest() {
        Some(at) => at.with_timezone(&Utc),
        None => now + chrono::Duration::days(1),
    };

    if candidate > now {
        candidate
    } else {
        candidate + chrono::Duration::days(1)
    }
}

/// Blocks until the daily quota reset, logging progress periodically
async fn wait_until_quota_reset(quota: &QuotaConfig, shutdown: &Shutdown) {
    let reset_at = next_reset_instant(Utc::now(), quota);
    tracing::info!(
        "Waiting for quota reset at {} ({}h{}m from now)",
        reset_at.format("%Y-%m-%d %H:%M:%S UTC"),
        (reset_at - Utc::now()).num_hours(),
        (reset_at - Utc::now()).num_minutes() % 60
    );

    while Utc::now() < reset_at {
        if shutdown.is_triggered() {
            return;
        }
        let left = (reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(QUOTA_WAIT_CHUNK);
        tokio::time::sleep(left).await;

        let remaining = reset_at - Utc::now();
        if remaining > chrono::Duration::zero() {
            tracing::info!(
                "Quota reset in {}h {}m",
                remaining.num_hours(),
                remaining.num_minutes() % 60
            );
        }
    }
    tracing::info!("Quota reset instant reached, resuming");
}

/// Sleeps for `duration` in shutdown-observable chunks
async fn sleep_with_shutdown(duration: Duration, shutdown: &Shutdown) {
    let deadline = std::time::Instant::now() + duration;
    while std::time::Instant::now() < deadline {
        if shutdown.is_triggered() {
            return;
        }
        let left = deadline
            .saturating_duration_since(std::time::Instant::now())
            .min(Duration::from_secs(1));
        tokio::time::sleep(left).await;
    }
}
