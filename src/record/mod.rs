//! Records and the dataset that accumulates them
//!
//! A [`Record`] is a flat, immutable mapping of optional named fields. The
//! [`Dataset`] is the ordered list of every record collected by a crawl job,
//! together with the seen-set of record IDs that keeps it free of duplicates
//! across runs.
//!
//! Turning a page body into raw records is site-specific and lives behind the
//! [`RecordParser`] trait.

mod selector;

pub use selector::SelectorRecordParser;

use crate::config::RecordsConfig;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

/// Untyped field mapping produced by a parser
pub type RawRecord = Map<String, Value>;

/// Field holding the URL of the page a record was read from
pub const PAGE_URL_FIELD: &str = "page_url";

/// Failure to turn one item of a page into a record
///
/// The orchestrator drops the item and keeps going.
#[derive(Debug, Clone, Error)]
#[error("item {index}: {message}")]
pub struct RecordParseError {
    pub index: usize,
    pub message: String,
}

/// What a parser knows about the page it is reading
#[derive(Debug, Clone)]
pub struct ParseContext<'a> {
    pub region_name: &'a str,
    pub region_code: &'a str,
    pub sub_area_name: &'a str,
    pub sub_area_code: &'a str,
    pub page: u32,
    pub url: &'a str,
}

/// Turns a page body into zero or more raw records
///
/// Implementations are site-specific. Each item is reported separately so a
/// single malformed item never costs the rest of the page.
pub trait RecordParser: Send {
    fn parse(&self, body: &str, context: &ParseContext<'_>)
        -> Vec<Result<RawRecord, RecordParseError>>;
}

/// A collected record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(RawRecord);

impl Record {
    pub fn new(fields: RawRecord) -> Self {
        Self(fields)
    }

    /// Wraps a JSON object; `None` for any other JSON value
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &RawRecord {
        &self.0
    }

    /// Returns a field, treating JSON null as absent
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// The dedup key: the ID field, else the fallback field (a detail URL),
    /// else the URL of the page the record came from
    pub fn record_id(&self, keys: &RecordsConfig) -> Option<String> {
        self.key_of(&keys.id_field)
            .or_else(|| {
                keys.fallback_id_field
                    .as_deref()
                    .and_then(|field| self.key_of(field))
            })
            .or_else(|| self.key_of(PAGE_URL_FIELD))
    }

    fn key_of(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The record date used by the date-range policy
    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        match self.get(field)? {
            Value::String(s) => parse_date(s),
            _ => None,
        }
    }
}

/// Parses `YYYY-MM-DD`, `YYYY/M/D` or `YYYY年M月D日` anywhere in `text`
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    static DATE: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = DATE
        .get_or_init(|| Regex::new(r"(\d{4})[年\-/](\d{1,2})[月\-/](\d{1,2})").ok())
        .as_ref()?;

    let captures = pattern.captures(text)?;
    let year = captures[1].parse().ok()?;
    let month = captures[2].parse().ok()?;
    let day = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Every record of a crawl job, plus the seen-set of their IDs
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<Record>,
    seen: HashSet<String>,
    keys: RecordsConfig,
}

impl Dataset {
    pub fn new(keys: RecordsConfig) -> Self {
        Self {
            records: Vec::new(),
            seen: HashSet::new(),
            keys,
        }
    }

    /// Rebuilds the seen-set from previously persisted records
    ///
    /// Loaded records are kept as-is, even if an older file holds duplicates.
    pub fn from_records(records: Vec<Record>, keys: RecordsConfig) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let mut duplicates = 0usize;
        for record in &records {
            if let Some(id) = record.record_id(&keys) {
                if !seen.insert(id) {
                    duplicates += 1;
                }
            }
        }
        if duplicates > 0 {
            tracing::warn!("Loaded snapshot contains {} duplicate record IDs", duplicates);
        }

        Self {
            records,
            seen,
            keys,
        }
    }

    /// Whether a record with this ID was already collected
    pub fn contains(&self, record: &Record) -> bool {
        record
            .record_id(&self.keys)
            .is_some_and(|id| self.seen.contains(&id))
    }

    /// Appends a record unless its ID was already seen
    ///
    /// Only a record that carries no key at all, not even its page URL, is
    /// appended without dedup.
    pub fn insert(&mut self, record: Record) -> bool {
        match record.record_id(&self.keys) {
            Some(id) => {
                if !self.seen.insert(id) {
                    return false;
                }
            }
            None => {
                tracing::debug!("Record has no '{}' field and no page URL, kept without dedup", self.keys.id_field);
            }
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct IDs seen so far
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
