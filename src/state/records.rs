//! Persisted record types
//!
//! Everything that lands in a snapshot document lives here. Records are
//! immutable after write: a later growth snapshot creates a new record
//! under a different timestamp key rather than mutating the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One top-level comment kept with a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub like_count: u64,
    pub reply_count: u64,
    pub author: String,
    pub published_at: String,
}

/// A fully enriched record from the initial harvest
///
/// The field contract is total: a record is only persisted when the
/// basic-info, channel-info, and comment lookups all produced data for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Title with hashtags stripped
    pub title: String,
    /// Description with hashtags stripped
    pub description: String,
    /// Platform tags merged with tags extracted from title/description
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub made_for_kids: bool,
    /// Parsed from the platform's ISO-8601 duration
    pub duration_secs: Option<u32>,
    pub published_at: DateTime<Utc>,
    pub channel_title: String,
    pub subscriber_count: Option<u64>,
    pub channel_video_count: Option<u64>,
    pub channel_view_count: Option<u64>,
    pub country: String,
    pub comments: Vec<Comment>,
}

/// A growth-snapshot record: the metric subset re-fetched on revisit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthRecord {
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub subscriber_count: Option<u64>,
    pub channel_video_count: Option<u64>,
    pub channel_view_count: Option<u64>,
    /// Comments carried forward from the prior snapshot when the re-fetch
    /// transiently failed
    pub comments: Vec<Comment>,
}
