//! Shared test harness: a scriptable platform backend and config builder

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shortsnap::config::{
    CategoryEntry, Config, CrawlerConfig, CredentialsConfig, DownloadConfig, FilterConfig,
    QuotaConfig, StorageConfig,
};
use shortsnap::filter::AgeBucket;
use shortsnap::platform::{ApiError, ChannelInfo, SearchPage, SearchRequest, VideoApi, VideoInfo};
use shortsnap::state::Comment;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted platform state shared across all credential-bound clients
#[derive(Default)]
pub struct MockBackend {
    /// Ids returned by every search call
    pub search_ids: Mutex<Vec<String>>,
    /// Basic info per id; ids absent here are missing upstream
    pub videos: Mutex<HashMap<String, VideoInfo>>,
    /// Video ids whose comment fetch fails transiently
    pub failing_comments: Mutex<HashSet<String>>,
    /// When set, every search call reports quota exhaustion
    pub quota_on_search: bool,
    /// When set, every basic-info call reports quota exhaustion
    pub quota_on_details: bool,
    /// Transient 5xx failures served before searches start succeeding
    pub search_failures: AtomicUsize,

    pub search_calls: AtomicUsize,
    pub detail_calls: Mutex<Vec<Vec<String>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn quota_exhausted() -> Arc<Self> {
        Arc::new(Self {
            quota_on_search: true,
            ..Self::default()
        })
    }

    /// Registers a video that searches will surface
    pub fn add_video(self: &Arc<Self>, info: VideoInfo) {
        self.search_ids.lock().unwrap().push(info.id.clone());
        self.videos.lock().unwrap().insert(info.id.clone(), info);
    }

    /// Client factory for a credential pool
    pub fn client_factory(self: &Arc<Self>) -> impl Fn(&str) -> MockApi + Send + Sync + Clone {
        let backend = Arc::clone(self);
        move |key: &str| MockApi {
            backend: Arc::clone(&backend),
            _key: key.to_string(),
        }
    }
}

/// One credential-bound client over the shared backend
pub struct MockApi {
    backend: Arc<MockBackend>,
    _key: String,
}

#[async_trait]
impl VideoApi for MockApi {
    async fn search_page(&self, _request: &SearchRequest) -> Result<SearchPage, ApiError> {
        self.backend.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.backend.quota_on_search {
            return Err(ApiError::http(
                403,
                Some("quotaExceeded".to_string()),
                "The request cannot be completed because you have exceeded your quota.",
            ));
        }
        if self
            .backend
            .search_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ApiError::http(500, None, "backend unavailable"));
        }
        Ok(SearchPage {
            ids: self.backend.search_ids.lock().unwrap().clone(),
            next_page_token: None,
            cost: 100,
        })
    }

    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoInfo>, ApiError> {
        self.backend
            .detail_calls
            .lock()
            .unwrap()
            .push(ids.to_vec());
        if self.backend.quota_on_details {
            return Err(ApiError::http(
                403,
                Some("dailyLimitExceeded".to_string()),
                "Daily limit exceeded.",
            ));
        }
        let videos = self.backend.videos.lock().unwrap();
        Ok(ids.iter().filter_map(|id| videos.get(id).cloned()).collect())
    }

    async fn channel_details(&self, channel_id: &str) -> Result<Option<ChannelInfo>, ApiError> {
        Ok(Some(ChannelInfo {
            title: format!("channel {}", channel_id),
            subscriber_count: Some(1_000),
            video_count: Some(50),
            view_count: Some(100_000),
            country: "US".to_string(),
        }))
    }

    async fn top_comments(&self, video_id: &str, _limit: u32) -> Result<Vec<Comment>, ApiError> {
        if self
            .backend
            .failing_comments
            .lock()
            .unwrap()
            .contains(video_id)
        {
            return Err(ApiError::transport("comment backend unavailable"));
        }
        Ok(vec![Comment {
            text: format!("first on {}", video_id),
            like_count: 3,
            reply_count: 1,
            author: "@viewer".to_string(),
            published_at: "2024-06-01T00:00:00Z".to_string(),
        }])
    }
}

/// A candidate video published `age_hours` ago
pub fn video(id: &str, age_hours: i64, views: u64, likes: u64, comments: u64) -> VideoInfo {
    video_with_duration(id, age_hours, views, likes, comments, 58)
}

pub fn video_with_duration(
    id: &str,
    age_hours: i64,
    views: u64,
    likes: u64,
    comments: u64,
    duration_secs: u32,
) -> VideoInfo {
    VideoInfo {
        id: id.to_string(),
        title: format!("video {} #shorts", id),
        description: "test upload".to_string(),
        tags: vec!["test".to_string()],
        channel_id: format!("ch-{}", id),
        channel_title: "Test Channel".to_string(),
        published_at: published(age_hours),
        language: Some("en".to_string()),
        view_count: Some(views),
        like_count: Some(likes),
        comment_count: Some(comments),
        made_for_kids: false,
        duration_secs: Some(duration_secs),
    }
}

pub fn published(age_hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(age_hours)
}

/// Bucket target table; unspecified buckets get zero
pub fn bucket_targets(filled: &[(AgeBucket, usize)]) -> BTreeMap<AgeBucket, usize> {
    let mut buckets = BTreeMap::new();
    for bucket in AgeBucket::ALL {
        buckets.insert(bucket, 0);
    }
    for (bucket, target) in filled {
        buckets.insert(*bucket, *target);
    }
    buckets
}

/// A small config over one "music" category
pub fn test_config(
    results_dir: &str,
    keys: usize,
    buckets: BTreeMap<AgeBucket, usize>,
) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 3,
            search_page_size: 50,
            search_max_pages: 2,
            query_retries: 2,
            comment_limit: 100,
            max_generations: 2,
            revisit_interval_days: 7,
            error_cooldown_secs: 1,
        },
        filter: FilterConfig::default(),
        quota: QuotaConfig::default(),
        storage: StorageConfig {
            results_dir: results_dir.to_string(),
            flush_cooldown_secs: 54,
            mirror_dir: None,
        },
        credentials: CredentialsConfig {
            api_keys: (0..keys).map(|i| format!("test-key-{}", i)).collect(),
        },
        download: DownloadConfig::default(),
        buckets,
        categories: vec![CategoryEntry {
            name: "music".to_string(),
            keywords: vec!["new music".to_string(), "music shorts".to_string()],
        }],
    }
}
