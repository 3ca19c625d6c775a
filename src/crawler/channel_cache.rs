//! Per-process channel attribute cache
//!
//! Videos processed concurrently often share a channel. The cache uses a
//! global lock only for map reads/inserts and a per-channel-id async lock
//! around the remote fetch, so videos from different channels never block
//! each other while videos sharing a channel collapse into one fetch.

use crate::platform::{CallError, ChannelInfo};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Memoized channel lookups, including explicit not-found tombstones
#[derive(Default)]
pub struct ChannelCache {
    /// channel id -> attributes, or None for a channel that does not exist
    entries: Mutex<HashMap<String, Option<ChannelInfo>>>,

    /// Per-channel-id fetch locks
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value, if any; the outer Option distinguishes a miss from a
    /// not-found tombstone
    pub fn cached(&self, channel_id: &str) -> Option<Option<ChannelInfo>> {
        self.entries.lock().unwrap().get(channel_id).cloned()
    }

    fn key_lock(&self, channel_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Returns the cached attributes or fetches them exactly once
    ///
    /// The cache is re-checked after acquiring the per-channel lock, so a
    /// concurrent fetch for the same channel that won the race is reused.
    /// Fetch errors are not cached; the next caller retries.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        channel_id: &str,
        fetch: F,
    ) -> Result<Option<ChannelInfo>, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<ChannelInfo>, CallError>>,
    {
        if let Some(hit) = self.cached(channel_id) {
            return Ok(hit);
        }

        let lock = self.key_lock(channel_id);
        let _guard = lock.lock().await;

        if let Some(hit) = self.cached(channel_id) {
            return Ok(hit);
        }

        let fetched = fetch().await?;
        if fetched.is_none() {
            tracing::warn!("Channel {} not found, caching tombstone", channel_id);
        }
        self.entries
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), fetched.clone());
        Ok(fetched)
    }

    /// Number of cached channels (tombstones included)
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Drops all entries and per-key locks (category boundaries)
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.locks.lock().unwrap().clear();
    }
}
