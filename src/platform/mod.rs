//! Platform API surface
//!
//! Service traits for the upstream video platform, the failure
//! classifier, the credential pool, and the production HTTP client.
//! The orchestrator is generic over [`VideoApi`] so tests drive it with
//! scripted implementations.

mod credentials;
mod error;
mod youtube;

pub use credentials::{call_with_rotation, ClientHandle, CredentialPool, PoolExhausted};
pub use error::{ApiError, CallError, FailureClass};
pub use youtube::YoutubeClient;

use crate::state::Comment;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One search call's parameters
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Only return records published at or after this instant
    pub published_after: Option<DateTime<Utc>>,
    pub page_size: u32,
    pub page_token: Option<String>,
}

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
    /// Quota units this call consumed
    pub cost: u64,
}

/// Basic per-video attributes from the batched lookup
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    pub language: Option<String>,
    /// Engagement counters; the platform reports some as unknown
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub made_for_kids: bool,
    /// Parsed from the platform's ISO-8601 duration string
    pub duration_secs: Option<u32>,
}

/// Channel-level attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub title: String,
    pub subscriber_count: Option<u64>,
    pub video_count: Option<u64>,
    pub view_count: Option<u64>,
    pub country: String,
}

/// The upstream video platform, keyed by one credential per client
///
/// All failures surface as classifiable [`ApiError`]s (§ the failure
/// classifier in [`error`]).
#[async_trait]
pub trait VideoApi: Send + Sync + 'static {
    /// One page of keyword search results, newest first
    async fn search_page(&self, request: &SearchRequest) -> Result<SearchPage, ApiError>;

    /// Batched basic-info lookup; ids absent upstream are simply missing
    /// from the result
    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoInfo>, ApiError>;

    /// Channel attributes, or None when the channel does not exist
    async fn channel_details(&self, channel_id: &str) -> Result<Option<ChannelInfo>, ApiError>;

    /// Up to `limit` top comments by relevance, without pagination
    async fn top_comments(&self, video_id: &str, limit: u32) -> Result<Vec<Comment>, ApiError>;
}
