//! The snapshot state store
//!
//! One container document per category (initial harvest) or per target
//! timestamp (growth snapshots), a progress ledger per generation, the
//! sequence log, revisit target maps, and the download ledger. Local
//! writes happen on every save and are crash-consistent; the remote flush
//! side-effect is throttled to bound upload request volume.

use crate::filter::BucketTargets;
use crate::store::{
    upload_with_retry, BlobSink, CategoryContainer, DownloadLedger, GrowthContainer,
    ProgressLedger, SequenceLog, StoreResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Delay before the single retry of a rate-limited upload
const UPLOAD_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Which generation's documents an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotScope {
    /// The initial harvest (`meta_snapshot/`)
    Harvest,
    /// Growth snapshot N (`snapshot_N/`), numbered from 1
    Generation(u32),
}

impl SnapshotScope {
    fn dir_name(&self) -> String {
        match self {
            Self::Harvest => "meta_snapshot".to_string(),
            Self::Generation(n) => format!("snapshot_{}", n),
        }
    }
}

/// Durable, resumable persistence with self-healing completion detection
pub struct SnapshotStore {
    root: PathBuf,
    sink: Option<Arc<dyn BlobSink>>,
    flush_cooldown: Duration,
    last_folder_flush: Mutex<Option<Instant>>,
    last_ledger_flush: Mutex<Option<Instant>>,
}

impl SnapshotStore {
    /// Opens (creating if needed) a store rooted at `root`
    pub fn new(
        root: impl Into<PathBuf>,
        flush_cooldown: Duration,
        sink: Option<Arc<dyn BlobSink>>,
    ) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(SnapshotScope::Harvest.dir_name()))?;
        std::fs::create_dir_all(root.join("yt_dlp"))?;

        Ok(Self {
            root,
            sink,
            flush_cooldown,
            last_folder_flush: Mutex::new(None),
            last_ledger_flush: Mutex::new(None),
        })
    }

    fn scope_dir(&self, scope: SnapshotScope) -> PathBuf {
        self.root.join(scope.dir_name())
    }

    /// Creates the directory for a generation before its first write
    pub fn ensure_scope(&self, scope: SnapshotScope) -> StoreResult<()> {
        std::fs::create_dir_all(self.scope_dir(scope))?;
        Ok(())
    }

    // ===== Category containers (initial harvest) =====

    /// Reads the per-category document if present
    pub fn load_category(&self, key: &str) -> StoreResult<Option<CategoryContainer>> {
        read_json(&self.category_path(key))
    }

    /// Writes the per-category document and maybe flushes the folder
    pub async fn save_category(
        &self,
        key: &str,
        container: &CategoryContainer,
    ) -> StoreResult<()> {
        write_json(&self.category_path(key), container)?;
        self.maybe_flush_folder(&self.scope_dir(SnapshotScope::Harvest))
            .await;
        Ok(())
    }

    fn category_path(&self, key: &str) -> PathBuf {
        self.scope_dir(SnapshotScope::Harvest)
            .join(format!("{}.json", key))
    }

    // ===== Growth containers =====

    pub fn load_growth(
        &self,
        generation: u32,
        timestamp: &str,
    ) -> StoreResult<Option<GrowthContainer>> {
        read_json(&self.growth_path(generation, timestamp))
    }

    pub async fn save_growth(
        &self,
        generation: u32,
        timestamp: &str,
        container: &GrowthContainer,
    ) -> StoreResult<()> {
        write_json(&self.growth_path(generation, timestamp), container)?;
        self.maybe_flush_folder(&self.scope_dir(SnapshotScope::Generation(generation)))
            .await;
        Ok(())
    }

    fn growth_path(&self, generation: u32, timestamp: &str) -> PathBuf {
        self.scope_dir(SnapshotScope::Generation(generation))
            .join(format!("{}.json", timestamp))
    }

    // ===== Progress ledgers =====

    /// Loads the completion ledger for a scope (empty when absent)
    pub fn load_progress(&self, scope: SnapshotScope) -> StoreResult<ProgressLedger> {
        Ok(read_json(&self.progress_path(scope))?.unwrap_or_default())
    }

    /// Writes the completion ledger and maybe publishes it
    pub async fn save_progress(
        &self,
        scope: SnapshotScope,
        ledger: &ProgressLedger,
    ) -> StoreResult<()> {
        let path = self.progress_path(scope);
        write_json(&path, ledger)?;
        self.maybe_flush_ledger(&path).await;
        Ok(())
    }

    fn progress_path(&self, scope: SnapshotScope) -> PathBuf {
        self.scope_dir(scope).join("progress.json")
    }

    // ===== Sequence log =====

    pub fn load_sequence(&self) -> StoreResult<SequenceLog> {
        Ok(read_json(&self.sequence_path())?.unwrap_or_default())
    }

    /// Sequence writes are local-only; the folder flush publishes them
    pub fn save_sequence(&self, sequence: &SequenceLog) -> StoreResult<()> {
        write_json(&self.sequence_path(), sequence)
    }

    fn sequence_path(&self) -> PathBuf {
        self.scope_dir(SnapshotScope::Harvest).join("sequence.json")
    }

    // ===== Revisit target maps =====

    pub fn load_target_map(
        &self,
        generation: u32,
    ) -> StoreResult<Option<BTreeMap<String, Vec<String>>>> {
        read_json(&self.target_map_path(generation))
    }

    pub fn save_target_map(
        &self,
        generation: u32,
        map: &BTreeMap<String, Vec<String>>,
    ) -> StoreResult<()> {
        self.ensure_scope(SnapshotScope::Generation(generation))?;
        write_json(&self.target_map_path(generation), map)
    }

    fn target_map_path(&self, generation: u32) -> PathBuf {
        self.scope_dir(SnapshotScope::Generation(generation))
            .join("target2ids.json")
    }

    // ===== Download ledger =====

    pub fn load_download_ledger(&self) -> StoreResult<DownloadLedger> {
        Ok(read_json(&self.download_ledger_path())?.unwrap_or_default())
    }

    pub fn save_download_ledger(&self, ledger: &DownloadLedger) -> StoreResult<()> {
        write_json(&self.download_ledger_path(), ledger)
    }

    fn download_ledger_path(&self) -> PathBuf {
        self.root.join("yt_dlp").join("progress.json")
    }

    // ===== Config hash record =====

    pub fn record_config_hash(&self, hash: &str) -> StoreResult<()> {
        std::fs::write(self.root.join("config_hash"), hash)?;
        Ok(())
    }

    pub fn load_config_hash(&self) -> Option<String> {
        std::fs::read_to_string(self.root.join("config_hash")).ok()
    }

    // ===== Completion =====

    /// Re-derives a category's completion state and heals stored state
    ///
    /// A category is complete iff its container carries an explicit true
    /// flag or every bucket has reached its target. The container flag and
    /// the ledger entry are corrected in both directions and persisted, so
    /// a ledger marked complete by a buggy or interrupted prior run cannot
    /// stall the harvest.
    pub async fn recompute_completion(
        &self,
        key: &str,
        targets: &BucketTargets,
    ) -> StoreResult<bool> {
        let container = self.load_category(key)?;
        let mut ledger = self.load_progress(SnapshotScope::Harvest)?;

        let complete = match container {
            Some(mut container) => {
                let mut complete = container.completed;
                if !complete && targets.all_filled(&container.bucket_counts()) {
                    tracing::info!(
                        "Category {} complete (all buckets at target), healing flag",
                        key
                    );
                    container.completed = true;
                    complete = true;
                    self.save_category(key, &container).await?;
                }
                complete
            }
            None => false,
        };

        if ledger.is_complete(key) != complete {
            if !complete {
                tracing::warn!(
                    "Category {} marked complete in ledger but is not; healing",
                    key
                );
            }
            ledger.mark(key, complete);
            self.save_progress(SnapshotScope::Harvest, &ledger).await?;
        }

        Ok(complete)
    }

    /// Per-bucket shortfall for a category
    pub fn missing_work(
        &self,
        key: &str,
        targets: &BucketTargets,
    ) -> StoreResult<BTreeMap<crate::filter::AgeBucket, usize>> {
        let counts = self
            .load_category(key)?
            .map(|c| c.bucket_counts())
            .unwrap_or_default();
        Ok(targets.shortfall(&counts))
    }

    // ===== Remote flushing =====

    /// Publishes a snapshot folder at most once per cooldown window
    ///
    /// Flush failures are logged, never propagated: local state is intact
    /// and the next window retries.
    async fn maybe_flush_folder(&self, folder: &Path) {
        let Some(sink) = self.sink.clone() else {
            return;
        };

        if !self.take_flush_slot(&self.last_folder_flush) {
            return;
        }

        if let Err(e) = upload_with_retry(sink.as_ref(), folder, UPLOAD_RETRY_DELAY).await {
            tracing::warn!("Remote flush of {} failed: {}", folder.display(), e);
        } else {
            tracing::info!("Published {} to remote sink", folder.display());
        }
    }

    async fn maybe_flush_ledger(&self, file: &Path) {
        let Some(sink) = self.sink.clone() else {
            return;
        };

        if !self.take_flush_slot(&self.last_ledger_flush) {
            return;
        }

        if let Err(e) = sink.upload_file(file).await {
            tracing::warn!("Remote flush of {} failed: {}", file.display(), e);
        }
    }

    /// Claims a flush slot if the cooldown window has elapsed
    fn take_flush_slot(&self, last: &Mutex<Option<Instant>>) -> bool {
        let mut last = last.lock().unwrap();
        if let Some(at) = *last {
            if at.elapsed() < self.flush_cooldown {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }
}

/// Reads a JSON document, treating corrupt content as absent
fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Document {} is corrupt, ignoring: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Writes a JSON document crash-consistently (write to temp, then rename)
fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
