//! Configuration module for Harrow
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Everything the crawl loop needs (targets, ceilings, thresholds, pacing,
//! date bounds, save interval) travels in one explicit [`Config`] value.
//!
//! # Example
//!
//! ```no_run
//! use harrow::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harrow.toml")).unwrap();
//! println!("Empty-page threshold: {}", config.crawler.max_empty_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, CrawlerConfig, FetcherConfig, FieldKind, FieldRule, OutputConfig,
    ParserConfig, RecordsConfig, RegionEntry, SubAreaEntry, UrlConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::{validate, validate_code};
