//! Configuration loading and validation
//!
//! The crawler is driven by an immutable configuration value loaded once at
//! startup: category keyword tables, per-bucket fill targets, filter and
//! quota policy, storage layout, and the credential list.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    CategoryEntry, Config, CrawlerConfig, CredentialsConfig, DownloadConfig, FilterConfig,
    QuotaConfig, StorageConfig,
};
