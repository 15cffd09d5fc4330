//! Harrow: a resumable incremental listing crawler
//!
//! This crate walks a two-level target hierarchy (region → sub-area → page),
//! survives network failures and anti-automation challenges, and never loses
//! or duplicates previously collected records across runs.

pub mod config;
pub mod crawler;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;
pub mod target;

use thiserror::Error;

/// Main error type for Harrow operations
#[derive(Debug, Error)]
pub enum HarrowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

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

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

/// Errors raised while resolving crawl targets
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Page index must be >= 1, got {0}")]
    InvalidPage(u32),

    #[error("Sub-area discovery for region {region} failed: {message}")]
    Discovery { region: String, message: String },
}

/// Result type alias for Harrow operations
pub type Result<T> = std::result::Result<T, HarrowError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Orchestrator, PageOutcome, RecoveryAction};
pub use record::{RawRecord, Record, RecordParser};
pub use state::{Checkpoint, SubAreaState};
pub use target::{PageRequest, Region, SubArea};
