//! Production client for the YouTube Data API v3
//!
//! A thin reqwest wrapper implementing [`VideoApi`]. Each client is bound
//! to one API key; the credential pool builds a fresh client on rotation.

use crate::platform::{ApiError, ChannelInfo, SearchPage, SearchRequest, VideoApi, VideoInfo};
use crate::state::Comment;
use crate::text::{is_cyrillic_query, parse_iso8601_duration};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";

/// Quota units charged per search call
const SEARCH_COST: u64 = 100;

/// Quota units charged per list call
const LOOKUP_COST: u64 = 1;

/// HTTP client bound to one API key
pub struct YoutubeClient {
    http: Client,
    key: String,
    base_url: Url,
}

impl YoutubeClient {
    pub fn new(key: &str) -> Self {
        // The default base URL is a constant and always parses
        let base_url = Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!());
        Self::with_base_url(key, base_url)
    }

    /// Builds a client against a custom endpoint (used by tests)
    pub fn with_base_url(key: &str, base_url: Url) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            key: key.to_string(),
            base_url,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| ApiError::transport(format!("bad endpoint {endpoint}: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
            query.append_pair("key", &self.key);
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error_body(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::transport(format!("invalid response body: {e}")))
    }
}

/// Extracts the structured reason and message from an error payload
fn parse_error_body(status: u16, body: &str) -> ApiError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
        #[serde(default)]
        errors: Vec<ErrorItem>,
    }
    #[derive(Deserialize)]
    struct ErrorItem {
        reason: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(detail) = parsed.error {
            let reason = detail.errors.into_iter().find_map(|item| item.reason);
            let message = detail.message.unwrap_or_else(|| body.to_string());
            return ApiError::http(status, reason, message);
        }
    }
    ApiError::http(status, None, body.to_string())
}

fn parse_count(raw: Option<&String>) -> Option<u64> {
    raw.and_then(|s| s.parse().ok())
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    snippet: Option<VideoSnippet>,
    statistics: Option<VideoStatistics>,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
    status: Option<VideoStatus>,
}

#[derive(Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "channelId", default)]
    channel_id: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "defaultLanguage")]
    default_language: Option<String>,
}

#[derive(Deserialize)]
struct VideoStatistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
    #[serde(rename = "commentCount")]
    comment_count: Option<String>,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct VideoStatus {
    #[serde(rename = "madeForKids")]
    made_for_kids: Option<bool>,
}

#[derive(Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize)]
struct ChannelItem {
    snippet: Option<ChannelSnippet>,
    statistics: Option<ChannelStatistics>,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    title: Option<String>,
    country: Option<String>,
}

#[derive(Deserialize)]
struct ChannelStatistics {
    #[serde(rename = "subscriberCount")]
    subscriber_count: Option<String>,
    #[serde(rename = "videoCount")]
    video_count: Option<String>,
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
}

#[derive(Deserialize)]
struct CommentThreadsResponse {
    #[serde(default)]
    items: Vec<CommentThread>,
}

#[derive(Deserialize)]
struct CommentThread {
    snippet: Option<ThreadSnippet>,
}

#[derive(Deserialize)]
struct ThreadSnippet {
    #[serde(rename = "topLevelComment")]
    top_level_comment: Option<TopLevelComment>,
    #[serde(rename = "totalReplyCount", default)]
    total_reply_count: u64,
}

#[derive(Deserialize)]
struct TopLevelComment {
    snippet: Option<CommentSnippet>,
}

#[derive(Deserialize)]
struct CommentSnippet {
    #[serde(rename = "textDisplay", default)]
    text_display: String,
    #[serde(rename = "likeCount", default)]
    like_count: u64,
    #[serde(rename = "authorDisplayName", default)]
    author_display_name: String,
    #[serde(rename = "publishedAt", default)]
    published_at: String,
}

#[async_trait]
impl VideoApi for YoutubeClient {
    async fn search_page(&self, request: &SearchRequest) -> Result<SearchPage, ApiError> {
        // Localize the search by query language
        let (language, region) = if is_cyrillic_query(&request.query) {
            ("ru", "RU")
        } else {
            ("en", "US")
        };

        let mut params = vec![
            ("part", "snippet".to_string()),
            ("q", request.query.clone()),
            ("type", "video".to_string()),
            ("order", "date".to_string()),
            ("maxResults", request.page_size.to_string()),
            ("safeSearch", "none".to_string()),
            ("relevanceLanguage", language.to_string()),
            ("regionCode", region.to_string()),
        ];
        if let Some(after) = request.published_after {
            params.push((
                "publishedAfter",
                after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(token) = &request.page_token {
            params.push(("pageToken", token.clone()));
        }

        let response: SearchResponse = self.get("search", &params).await?;

        Ok(SearchPage {
            ids: response
                .items
                .into_iter()
                .filter_map(|item| item.id.video_id)
                .collect(),
            next_page_token: response.next_page_token,
            cost: SEARCH_COST,
        })
    }

    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoInfo>, ApiError> {
        let params = vec![
            ("part", "snippet,contentDetails,statistics,status".to_string()),
            ("id", ids.join(",")),
        ];

        let response: VideoListResponse = self.get("videos", &params).await?;

        let mut details = Vec::with_capacity(response.items.len());
        for item in response.items {
            let snippet = match item.snippet {
                Some(s) => s,
                None => continue,
            };
            let published_at = match snippet.published_at {
                Some(t) => t,
                None => continue,
            };
            let statistics = item.statistics.unwrap_or(VideoStatistics {
                view_count: None,
                like_count: None,
                comment_count: None,
            });

            details.push(VideoInfo {
                id: item.id,
                title: snippet.title,
                description: snippet.description,
                tags: snippet.tags,
                channel_id: snippet.channel_id,
                channel_title: snippet.channel_title,
                published_at,
                language: snippet.default_language,
                view_count: parse_count(statistics.view_count.as_ref()),
                like_count: parse_count(statistics.like_count.as_ref()),
                comment_count: parse_count(statistics.comment_count.as_ref()),
                made_for_kids: item
                    .status
                    .and_then(|s| s.made_for_kids)
                    .unwrap_or(false),
                duration_secs: item
                    .content_details
                    .and_then(|c| c.duration)
                    .as_deref()
                    .and_then(parse_iso8601_duration),
            });
        }
        Ok(details)
    }

    async fn channel_details(&self, channel_id: &str) -> Result<Option<ChannelInfo>, ApiError> {
        let params = vec![
            ("part", "snippet,statistics".to_string()),
            ("id", channel_id.to_string()),
        ];

        let response: ChannelListResponse = self.get("channels", &params).await?;

        // An empty item list means the channel does not exist
        let item = match response.items.into_iter().next() {
            Some(item) => item,
            None => return Ok(None),
        };

        let snippet = item.snippet;
        let statistics = item.statistics;

        Ok(Some(ChannelInfo {
            title: snippet
                .as_ref()
                .and_then(|s| s.title.clone())
                .unwrap_or_default(),
            subscriber_count: statistics
                .as_ref()
                .and_then(|s| parse_count(s.subscriber_count.as_ref())),
            video_count: statistics
                .as_ref()
                .and_then(|s| parse_count(s.video_count.as_ref())),
            view_count: statistics
                .as_ref()
                .and_then(|s| parse_count(s.view_count.as_ref())),
            country: snippet
                .and_then(|s| s.country)
                .unwrap_or_default(),
        }))
    }

    async fn top_comments(&self, video_id: &str, limit: u32) -> Result<Vec<Comment>, ApiError> {
        let params = vec![
            ("part", "snippet".to_string()),
            ("maxResults", limit.to_string()),
            ("order", "relevance".to_string()),
            ("videoId", video_id.to_string()),
        ];

        let response: CommentThreadsResponse = self.get("commentThreads", &params).await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|thread| {
                let snippet = thread.snippet?;
                let reply_count = snippet.total_reply_count;
                let top = snippet.top_level_comment?.snippet?;
                Some(Comment {
                    text: top.text_display,
                    like_count: top.like_count,
                    reply_count,
                    author: top.author_display_name,
                    published_at: top.published_at,
                })
            })
            .collect())
    }
}
