use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a crawl job resumes
///
/// A checkpoint is a snapshot, not a log: each save replaces the previous
/// one. The position fields are cleared when a region completes, leaving only
/// the cumulative per-region counts. It is only meaningful together with the
/// dataset snapshot, whose seen-set prevents re-collecting records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub current_region_code: Option<String>,

    #[serde(default)]
    pub current_sub_area_index: Option<usize>,

    #[serde(default)]
    pub next_page_index: Option<u32>,

    /// Records collected per region code, across all runs
    #[serde(default)]
    pub per_region_counts: BTreeMap<String, u64>,

    pub timestamp: DateTime<Utc>,

    /// Hash of the configuration the checkpoint was written under
    #[serde(default)]
    pub config_hash: Option<String>,
}

/// The resumable part of a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePosition {
    pub region_code: String,
    pub sub_area_index: usize,
    pub next_page: Option<u32>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            current_region_code: None,
            current_sub_area_index: None,
            next_page_index: None,
            per_region_counts: BTreeMap::new(),
            timestamp: Utc::now(),
            config_hash: None,
        }
    }
}

impl Checkpoint {
    /// Records that the next page to fetch is `next_page` of the given sub-area
    pub fn set_position(&mut self, region_code: &str, sub_area_index: usize, next_page: u32) {
        self.current_region_code = Some(region_code.to_string());
        self.current_sub_area_index = Some(sub_area_index);
        self.next_page_index = Some(next_page);
        self.timestamp = Utc::now();
    }

    /// Drops the in-progress position, keeping cumulative counts
    pub fn clear_position(&mut self) {
        self.current_region_code = None;
        self.current_sub_area_index = None;
        self.next_page_index = None;
        self.timestamp = Utc::now();
    }

    /// The in-progress position, if any
    pub fn position(&self) -> Option<ResumePosition> {
        Some(ResumePosition {
            region_code: self.current_region_code.clone()?,
            sub_area_index: self.current_sub_area_index.unwrap_or(0),
            next_page: self.next_page_index,
        })
    }

    /// Adds newly collected records to a region's count
    pub fn add_records(&mut self, region_code: &str, count: u64) {
        if count > 0 {
            *self
                .per_region_counts
                .entry(region_code.to_string())
                .or_insert(0) += count;
        }
    }

    pub fn total_records(&self) -> u64 {
        self.per_region_counts.values().sum()
    }
}
