use crate::config::types::{Config, CrawlerConfig, FilterConfig, QuotaConfig};
use crate::filter::AgeBucket;
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_filter_config(&config.filter)?;
    validate_quota_config(&config.quota)?;
    validate_storage(config)?;
    validate_credentials(config)?;
    validate_buckets(config)?;
    validate_categories(config)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.search_page_size < 1 || config.search_page_size > 50 {
        return Err(ConfigError::Validation(format!(
            "search-page-size must be between 1 and 50, got {}",
            config.search_page_size
        )));
    }

    if config.search_max_pages < 1 {
        return Err(ConfigError::Validation(
            "search-max-pages must be >= 1".to_string(),
        ));
    }

    if config.query_retries < 1 {
        return Err(ConfigError::Validation(
            "query-retries must be >= 1".to_string(),
        ));
    }

    if config.comment_limit > 100 {
        return Err(ConfigError::Validation(format!(
            "comment-limit must be <= 100 (platform maximum), got {}",
            config.comment_limit
        )));
    }

    if config.revisit_interval_days < 1 {
        return Err(ConfigError::Validation(format!(
            "revisit-interval-days must be >= 1, got {}",
            config.revisit_interval_days
        )));
    }

    Ok(())
}

/// Validates filter configuration
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.quality_percentile <= 0.0 || config.quality_percentile >= 100.0 {
        return Err(ConfigError::Validation(format!(
            "quality-percentile must be in (0, 100), got {}",
            config.quality_percentile
        )));
    }

    if config.smoothing <= 0.0 || config.smoothing > 1.0 {
        return Err(ConfigError::Validation(format!(
            "smoothing must be in (0, 1], got {}",
            config.smoothing
        )));
    }

    if config.min_samples < 1 {
        return Err(ConfigError::Validation(
            "min-samples must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the quota reset schedule
fn validate_quota_config(config: &QuotaConfig) -> Result<(), ConfigError> {
    if config.reset_hour > 23 {
        return Err(ConfigError::Validation(format!(
            "reset-hour must be between 0 and 23, got {}",
            config.reset_hour
        )));
    }

    if config.reset_minute > 59 {
        return Err(ConfigError::Validation(format!(
            "reset-minute must be between 0 and 59, got {}",
            config.reset_minute
        )));
    }

    if config.utc_offset_hours < -12 || config.utc_offset_hours > 14 {
        return Err(ConfigError::Validation(format!(
            "utc-offset-hours must be between -12 and 14, got {}",
            config.utc_offset_hours
        )));
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ConfigError> {
    if config.storage.results_dir.is_empty() {
        return Err(ConfigError::Validation(
            "results-dir cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_credentials(config: &Config) -> Result<(), ConfigError> {
    if config.credentials.api_keys.is_empty() {
        return Err(ConfigError::Validation(
            "at least one API key is required".to_string(),
        ));
    }

    if config.credentials.api_keys.iter().any(|k| k.is_empty()) {
        return Err(ConfigError::Validation(
            "API keys cannot be empty strings".to_string(),
        ));
    }

    Ok(())
}

/// Validates that the bucket table covers all eight age buckets
fn validate_buckets(config: &Config) -> Result<(), ConfigError> {
    for bucket in AgeBucket::ALL {
        if !config.buckets.contains_key(&bucket) {
            return Err(ConfigError::Validation(format!(
                "bucket table is missing '{}'",
                bucket.label()
            )));
        }
    }

    if config.category_target() == 0 {
        return Err(ConfigError::Validation(
            "bucket targets must not all be zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_categories(config: &Config) -> Result<(), ConfigError> {
    if config.categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[category]] is required".to_string(),
        ));
    }

    for entry in &config.categories {
        if entry.name.is_empty() {
            return Err(ConfigError::Validation(
                "category name cannot be empty".to_string(),
            ));
        }

        if entry.keywords.is_empty() {
            return Err(ConfigError::Validation(format!(
                "category '{}' must have at least one keyword",
                entry.name
            )));
        }
    }

    let mut names: Vec<&str> = config.categories.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    if names.len() != config.categories.len() {
        return Err(ConfigError::Validation(
            "category names must be unique".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        CategoryEntry, CredentialsConfig, DownloadConfig, StorageConfig,
    };
    use std::collections::BTreeMap;

    fn base_config() -> Config {
        let mut buckets = BTreeMap::new();
        for bucket in AgeBucket::ALL {
            buckets.insert(bucket, 10);
        }
        Config {
            crawler: CrawlerConfig {
                workers: 5,
                search_page_size: 50,
                search_max_pages: 9,
                query_retries: 3,
                comment_limit: 100,
                max_generations: 3,
                revisit_interval_days: 7,
                error_cooldown_secs: 60,
            },
            filter: FilterConfig::default(),
            quota: QuotaConfig::default(),
            storage: StorageConfig {
                results_dir: "./results".to_string(),
                flush_cooldown_secs: 54,
                mirror_dir: None,
            },
            credentials: CredentialsConfig {
                api_keys: vec!["key-1".to_string()],
            },
            download: DownloadConfig::default(),
            buckets,
            categories: vec![CategoryEntry {
                name: "music".to_string(),
                keywords: vec!["new music".to_string()],
            }],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = base_config();
        config.crawler.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_oversized_page_rejected() {
        let mut config = base_config();
        config.crawler.search_page_size = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_bucket_rejected() {
        let mut config = base_config();
        config.buckets.remove(&AgeBucket::OneDayOneWeek);
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("1day-1week"));
    }

    #[test]
    fn test_empty_keys_rejected() {
        let mut config = base_config();
        config.credentials.api_keys.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut config = base_config();
        config.categories.push(config.categories[0].clone());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_keywords_rejected() {
        let mut config = base_config();
        config.categories[0].keywords.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_smoothing_rejected() {
        let mut config = base_config();
        config.filter.smoothing = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_reset_hour_rejected() {
        let mut config = base_config();
        config.quota.reset_hour = 24;
        assert!(validate(&config).is_err());
    }
}
