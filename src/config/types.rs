use crate::filter::{AgeBucket, FilterRule};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for shortsnap
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    pub storage: StorageConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    /// Per-bucket fill targets; the sum is the per-category total target
    pub buckets: BTreeMap<AgeBucket, usize>,
    #[serde(default, rename = "category")]
    pub categories: Vec<CategoryEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Size of the worker pool for per-video enrichment fan-outs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Page size for search calls (the platform caps this at 50)
    #[serde(rename = "search-page-size", default = "default_page_size")]
    pub search_page_size: u32,

    /// Maximum number of search pages fetched per query
    #[serde(rename = "search-max-pages", default = "default_max_pages")]
    pub search_max_pages: u32,

    /// Retry budget per search query for unrelated errors
    #[serde(rename = "query-retries", default = "default_query_retries")]
    pub query_retries: u32,

    /// Maximum top comments fetched per video
    #[serde(rename = "comment-limit", default = "default_comment_limit")]
    pub comment_limit: u32,

    /// Number of growth-snapshot generations after the initial harvest
    #[serde(rename = "max-generations", default = "default_max_generations")]
    pub max_generations: u32,

    /// Days between a record's discovery and each re-visitation
    #[serde(rename = "revisit-interval-days", default = "default_revisit_days")]
    pub revisit_interval_days: i64,

    /// Cooldown after an unexpected top-level error before retrying
    #[serde(rename = "error-cooldown-secs", default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,
}

/// Adaptive engagement filter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Combination rule over the three metric thresholds
    #[serde(default)]
    pub rule: FilterRule,

    /// Hard ceiling on video duration, applied before the rule
    #[serde(rename = "max-duration-secs", default = "default_max_duration")]
    pub max_duration_secs: u32,

    /// Minimum rolling samples before thresholds may move
    #[serde(rename = "min-samples", default = "default_min_samples")]
    pub min_samples: usize,

    /// Accepted records between threshold recomputations
    #[serde(rename = "recompute-interval", default = "default_recompute_interval")]
    pub recompute_interval: usize,

    /// Percentile of the rolling arrays the thresholds chase
    #[serde(rename = "quality-percentile", default = "default_percentile")]
    pub quality_percentile: f64,

    /// Fraction of the gap to the target percentile closed per recompute
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
}

/// Daily quota reset schedule of the platform API
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Hour of the reset instant, in the configured offset
    #[serde(rename = "reset-hour", default = "default_reset_hour")]
    pub reset_hour: u32,

    /// Minute of the reset instant
    #[serde(rename = "reset-minute", default = "default_reset_minute")]
    pub reset_minute: u32,

    /// Fixed UTC offset the reset clock is defined in, in hours
    #[serde(rename = "utc-offset-hours", default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

/// Snapshot storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for snapshot documents
    #[serde(rename = "results-dir")]
    pub results_dir: String,

    /// Minimum seconds between remote flushes of snapshot folders
    #[serde(rename = "flush-cooldown-secs", default = "default_flush_cooldown")]
    pub flush_cooldown_secs: u64,

    /// Durable mirror directory; remote flushing is disabled when unset
    #[serde(rename = "mirror-dir", default)]
    pub mirror_dir: Option<String>,
}

/// API credential list
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Platform API keys, rotated in order on quota exhaustion
    #[serde(rename = "api-keys")]
    pub api_keys: Vec<String>,
}

/// Video download collaborator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Path to the downloader binary
    #[serde(default = "default_download_binary")]
    pub binary: String,

    /// Directory of cookie files rotated on blocked downloads
    #[serde(rename = "cookies-dir", default)]
    pub cookies_dir: Option<String>,

    /// Per-download timeout
    #[serde(rename = "timeout-secs", default = "default_download_timeout")]
    pub timeout_secs: u64,
}

/// A search category with its keyword list
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    /// Category name, also the container document key
    pub name: String,

    /// Search queries tried in order until the category fills
    pub keywords: Vec<String>,
}

impl Config {
    /// Total per-category record target (sum of all bucket targets)
    pub fn category_target(&self) -> usize {
        self.buckets.values().sum()
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            rule: FilterRule::default(),
            max_duration_secs: default_max_duration(),
            min_samples: default_min_samples(),
            recompute_interval: default_recompute_interval(),
            quality_percentile: default_percentile(),
            smoothing: default_smoothing(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            reset_hour: default_reset_hour(),
            reset_minute: default_reset_minute(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            binary: default_download_binary(),
            cookies_dir: None,
            timeout_secs: default_download_timeout(),
        }
    }
}

fn default_workers() -> usize {
    5
}

fn default_page_size() -> u32 {
    50
}

fn default_max_pages() -> u32 {
    9
}

fn default_query_retries() -> u32 {
    3
}

fn default_comment_limit() -> u32 {
    100
}

fn default_max_generations() -> u32 {
    3
}

fn default_revisit_days() -> i64 {
    7
}

fn default_error_cooldown() -> u64 {
    60
}

fn default_max_duration() -> u32 {
    900
}

fn default_min_samples() -> usize {
    50
}

fn default_recompute_interval() -> usize {
    50
}

fn default_percentile() -> f64 {
    25.0
}

fn default_smoothing() -> f64 {
    0.3
}

fn default_reset_hour() -> u32 {
    11
}

fn default_reset_minute() -> u32 {
    1
}

fn default_utc_offset() -> i32 {
    3
}

fn default_flush_cooldown() -> u64 {
    54
}

fn default_download_binary() -> String {
    "yt-dlp".to_string()
}

fn default_download_timeout() -> u64 {
    600
}
