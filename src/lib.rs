//! Shortsnap: a resumable short-video metadata harvester
//!
//! This crate implements a batch crawler that discovers short-form videos
//! through keyword search, screens them with self-adjusting engagement
//! thresholds, and persists enriched metadata into append-only snapshot
//! documents that are revisited on a schedule to measure growth over time.

pub mod config;
pub mod crawler;
pub mod download;
pub mod filter;
pub mod platform;
pub mod state;
pub mod store;
pub mod text;

use thiserror::Error;

/// Main error type for shortsnap operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Platform API error: {0}")]
    Api(#[from] platform::ApiError),

    #[error("All API credentials exhausted")]
    QuotaExhausted,

    #[error("Invalid snapshot timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for shortsnap operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use filter::{AdaptiveFilter, AgeBucket, BucketTargets, FilterRule};
pub use platform::{ApiError, CredentialPool, FailureClass};
pub use state::{PassOutcome, RunPlan, VideoRecord};
pub use store::SnapshotStore;
