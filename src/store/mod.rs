//! Snapshot persistence
//!
//! Durable, resumable storage for the crawl: per-category container
//! documents, per-generation progress ledgers, the append-only sequence
//! log, revisit target maps, and the download ledger. Local writes are
//! crash-consistent (write-then-rename); publishing to the durable remote
//! sink is throttled separately.

mod remote;
mod snapshot;

pub use remote::{upload_with_retry, BlobSink, MirrorSink, UploadError};
pub use snapshot::{SnapshotScope, SnapshotStore};

use crate::filter::AgeBucket;
use crate::state::{GrowthRecord, VideoRecord};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

/// Timestamp format used for sequence and snapshot keys
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M";

/// Appends within this window coalesce into the previous sequence entry
const SEQUENCE_COALESCE_SECS: i64 = 60;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Formats an instant as a snapshot timestamp key
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a snapshot timestamp key back into an instant
pub fn parse_timestamp(key: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(key, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// One category's harvest document
///
/// Buckets, used queries, and the completion flag are explicit fields
/// rather than reserved keys mixed into the record map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryContainer {
    /// Records grouped by publish-age bucket
    #[serde(default)]
    pub buckets: BTreeMap<AgeBucket, BTreeMap<String, VideoRecord>>,

    /// Search queries already exhausted for this category
    #[serde(default)]
    pub used_queries: BTreeSet<String>,

    #[serde(default)]
    pub completed: bool,
}

impl CategoryContainer {
    pub fn new() -> Self {
        let mut buckets = BTreeMap::new();
        for bucket in AgeBucket::ALL {
            buckets.insert(bucket, BTreeMap::new());
        }
        Self {
            buckets,
            used_queries: BTreeSet::new(),
            completed: false,
        }
    }

    /// Record count per bucket
    pub fn bucket_counts(&self) -> BTreeMap<AgeBucket, usize> {
        AgeBucket::ALL
            .iter()
            .map(|b| (*b, self.buckets.get(b).map_or(0, |m| m.len())))
            .collect()
    }

    /// Total records across all buckets
    pub fn total_records(&self) -> usize {
        self.buckets.values().map(|m| m.len()).sum()
    }

    /// Inserts a record; returns false when the id is already present
    pub fn insert(&mut self, bucket: AgeBucket, id: String, record: VideoRecord) -> bool {
        let slot = self.buckets.entry(bucket).or_default();
        if slot.contains_key(&id) {
            return false;
        }
        slot.insert(id, record);
        true
    }

    /// Iterates all records regardless of bucket
    pub fn records(&self) -> impl Iterator<Item = (&String, &VideoRecord)> {
        self.buckets.values().flat_map(|m| m.iter())
    }
}

impl Default for CategoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// One growth snapshot's document: a flat id-keyed record map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrowthContainer(pub BTreeMap<String, GrowthRecord>);

impl GrowthContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Completion ledger: the source of truth for what remains to crawl
///
/// Entries are re-derived on load (`SnapshotStore::recompute_completion`)
/// rather than blindly trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressLedger(pub BTreeMap<String, bool>);

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    pub fn mark(&mut self, key: &str, complete: bool) {
        self.0.insert(key.to_string(), complete);
    }

    /// True when every listed key is marked complete
    pub fn all_complete<'a, I: IntoIterator<Item = &'a str>>(&self, keys: I) -> bool {
        keys.into_iter().all(|k| self.is_complete(k))
    }
}

/// Append-only log of ids by discovery time
///
/// Reconstructs "what was seen when" and seeds both the dedup index and
/// the revisit target maps. Never used for dedup directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceLog(pub BTreeMap<String, Vec<String>>);

impl SequenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly admitted ids under a discovery timestamp
    ///
    /// Appends landing within the coalesce window of the latest entry are
    /// folded into it so rapid successive saves share one revisit slot.
    pub fn append(&mut self, now: DateTime<Utc>, ids: &[String]) {
        if ids.is_empty() {
            return;
        }

        let mut target = format_timestamp(now);
        if let Some(last_key) = self.0.keys().next_back().cloned() {
            if let Some(last_at) = parse_timestamp(&last_key) {
                if last_at + Duration::seconds(SEQUENCE_COALESCE_SECS) >= now {
                    target = last_key;
                }
            }
        }

        let entry = self.0.entry(target).or_default();
        let existing: HashSet<&String> = entry.iter().collect();
        let fresh: Vec<String> = ids
            .iter()
            .filter(|id| !existing.contains(id))
            .cloned()
            .collect();
        entry.extend(fresh);
    }

    /// Every id ever recorded, across all timestamps
    pub fn all_ids(&self) -> HashSet<String> {
        self.0.values().flatten().cloned().collect()
    }

    pub fn total_ids(&self) -> usize {
        self.0.values().map(|v| v.len()).sum()
    }
}

/// Set of all ids ever admitted into the initial harvest
///
/// Grows monotonically; never shrinks. Rebuilt from the sequence log at
/// startup so restarts cannot re-admit previously seen records.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex(HashSet<String>);

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sequence(sequence: &SequenceLog) -> Self {
        Self(sequence.all_ids())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn admit(&mut self, id: &str) {
        self.0.insert(id.to_string());
    }

    /// Filters a search result set down to never-seen ids
    pub fn filter_new(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter(|id| !self.0.contains(*id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Flat progress document for the download collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadLedger {
    #[serde(default)]
    pub processed_video_ids: BTreeSet<String>,
    #[serde(default)]
    pub count: usize,
}

impl DownloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processed_video_ids.contains(id)
    }

    pub fn record(&mut self, id: &str) {
        self.processed_video_ids.insert(id.to_string());
        self.count = self.processed_video_ids.len();
    }
}
