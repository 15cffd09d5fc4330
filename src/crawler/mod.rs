//! Crawler module for page fetching and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic and identity rotation
//! - Page outcome classification
//! - Operator-assisted recovery from challenge and ambiguous pages
//! - Overall crawl coordination

mod classifier;
mod coordinator;
mod fetcher;
mod journal;
mod operator;
mod recovery;

pub use classifier::{PageClassifier, PageOutcome};
pub use coordinator::Orchestrator;
pub use fetcher::{build_http_client, Credentials, FetchError, Fetcher, Jitter};
pub use journal::Journal;
pub use operator::{ConsoleOperator, Operator, OperatorRequest, ScriptedOperator};
pub use recovery::{RecoveryAction, RecoveryContext, RecoveryCoordinator};

use crate::config::Config;
use crate::ConfigError;
use crate::output::RunReport;
use crate::record::SelectorRecordParser;
use crate::HarrowError;

/// Runs a complete interactive crawl
///
/// This is the main entry point used by the binary. It will:
/// 1. Build the selector parser from the `[parser]` section
/// 2. Load the snapshot and checkpoint
/// 3. Crawl every region with a console operator, until done or Ctrl+C
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, stored in the checkpoint
/// * `fresh` - Ignore the stored checkpoint and start from the first region
pub async fn crawl(config: Config, config_hash: &str, fresh: bool) -> Result<RunReport, HarrowError> {
    let parser_config = config.parser.as_ref().ok_or_else(|| {
        ConfigError::Validation("a [parser] section is required to crawl".to_string())
    })?;
    let parser = SelectorRecordParser::new(parser_config)?;

    let mut orchestrator = Orchestrator::new(
        config,
        Box::new(parser),
        Box::new(ConsoleOperator::new()),
    )?
    .with_config_hash(config_hash);

    if fresh {
        orchestrator = orchestrator.ignore_checkpoint();
    }

    orchestrator.run_until_shutdown().await
}
