//! Run statistics
//!
//! Counters accumulated by the orchestrator during one process run and
//! printed by the binary when the run ends.

use crate::state::DoneReason;
use std::collections::BTreeMap;
use std::fmt;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every region was crawled
    Completed,

    /// The operator stopped the run at a recovery prompt
    Aborted,

    /// A stop signal was received between pages
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted by operator",
            Self::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// A sub-area that ended on a fetch failure, or a region that could not be
/// resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub page: Option<u32>,
    pub message: String,
}

/// Statistics of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,

    /// Successful fetches of list pages
    pub pages_fetched: u64,

    /// Records appended to the dataset in this run
    pub records_added: u64,

    /// Records added in this run, per region code
    pub per_region_counts: BTreeMap<String, u64>,

    /// Finished sub-areas, per reason
    pub sub_areas_done: BTreeMap<String, u64>,

    pub sub_area_failures: Vec<TargetFailure>,

    /// Flushes that did not fully reach the disk
    pub persistence_failures: usize,

    /// Size of the dataset when the run ended
    pub dataset_size: usize,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            status: RunStatus::Completed,
            pages_fetched: 0,
            records_added: 0,
            per_region_counts: BTreeMap::new(),
            sub_areas_done: BTreeMap::new(),
            sub_area_failures: Vec::new(),
            persistence_failures: 0,
            dataset_size: 0,
        }
    }
}

impl RunReport {
    pub fn record_added(&mut self, region_code: &str, count: u64) {
        if count == 0 {
            return;
        }
        self.records_added += count;
        *self
            .per_region_counts
            .entry(region_code.to_string())
            .or_insert(0) += count;
    }

    pub fn sub_area_done(&mut self, reason: DoneReason) {
        *self.sub_areas_done.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn failure(&mut self, target: &str, page: Option<u32>, message: impl Into<String>) {
        self.sub_area_failures.push(TargetFailure {
            target: target.to_string(),
            page,
            message: message.into(),
        });
    }
}

/// Prints a report to stdout
pub fn print_report(report: &RunReport) {
    println!("=== Crawl Report ===\n");

    println!("Status: {}", report.status);
    println!("  Pages fetched: {}", report.pages_fetched);
    println!("  Records added: {}", report.records_added);
    println!("  Dataset size: {}", report.dataset_size);
    println!();

    if !report.per_region_counts.is_empty() {
        println!("Records by Region:");
        for (region, count) in &report.per_region_counts {
            println!("  {}: {}", region, count);
        }
        println!();
    }

    if !report.sub_areas_done.is_empty() {
        println!("Sub-areas Finished:");
        let mut reasons: Vec<_> = report.sub_areas_done.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1));
        for (reason, count) in reasons {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if !report.sub_area_failures.is_empty() {
        println!("Failures ({}):", report.sub_area_failures.len());
        for failure in &report.sub_area_failures {
            match failure.page {
                Some(page) => println!("  - {} page {}: {}", failure.target, page, failure.message),
                None => println!("  - {}: {}", failure.target, failure.message),
            }
        }
        println!();
    }

    if report.persistence_failures > 0 {
        println!(
            "WARNING: {} flushes failed; check the snapshot and checkpoint paths",
            report.persistence_failures
        );
    }
}
