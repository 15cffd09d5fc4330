//! Selector-driven record parser
//!
//! Extracts one record per element matched by the configured item selector.
//! Each field rule picks an element inside the item, reads its text or an
//! attribute, optionally narrows the value with a regex and converts it to
//! the declared kind.

use super::{parse_date, ParseContext, RawRecord, RecordParseError, RecordParser, PAGE_URL_FIELD};
use crate::config::{FieldKind, FieldRule, ParserConfig};
use crate::HarrowError;
use chrono::Local;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Number, Value};
use std::sync::OnceLock;

struct CompiledField {
    name: String,
    selector: Selector,
    attribute: Option<String>,
    pattern: Option<Regex>,
    kind: FieldKind,
    required: bool,
}

/// [`RecordParser`] configured from `[parser]` selector rules
pub struct SelectorRecordParser {
    item_selector: Selector,
    fields: Vec<CompiledField>,
}

impl SelectorRecordParser {
    /// Compiles the selectors and patterns of a parser configuration
    pub fn new(config: &ParserConfig) -> Result<Self, HarrowError> {
        let item_selector = compile_selector(&config.item_selector)?;
        let fields = config
            .fields
            .iter()
            .map(compile_field)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            item_selector,
            fields,
        })
    }

    fn extract(&self, item: ElementRef<'_>) -> Result<RawRecord, String> {
        let mut record = RawRecord::new();

        for field in &self.fields {
            let value = item
                .select(&field.selector)
                .next()
                .and_then(|element| read_value(element, field.attribute.as_deref()))
                .and_then(|raw| narrow(&raw, field.pattern.as_ref()))
                .and_then(|raw| convert(&raw, field.kind));

            match value {
                Some(value) => {
                    record.insert(field.name.clone(), value);
                }
                None if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                None => {
                    record.insert(field.name.clone(), Value::Null);
                }
            }
        }

        Ok(record)
    }
}

impl RecordParser for SelectorRecordParser {
    fn parse(
        &self,
        body: &str,
        context: &ParseContext<'_>,
    ) -> Vec<Result<RawRecord, RecordParseError>> {
        let document = Html::parse_document(body);
        let crawl_time = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();

        document
            .select(&self.item_selector)
            .enumerate()
            .map(|(index, item)| {
                let mut record = self
                    .extract(item)
                    .map_err(|message| RecordParseError { index, message })?;
                record.insert("region".to_string(), Value::from(context.region_name));
                record.insert("sub_area".to_string(), Value::from(context.sub_area_name));
                record.insert("crawl_time".to_string(), Value::from(crawl_time.clone()));
                record.insert(PAGE_URL_FIELD.to_string(), Value::from(context.url));
                Ok(record)
            })
            .collect()
    }
}

fn compile_selector(selector: &str) -> Result<Selector, HarrowError> {
    Selector::parse(selector).map_err(|e| HarrowError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

fn compile_field(rule: &FieldRule) -> Result<CompiledField, HarrowError> {
    Ok(CompiledField {
        name: rule.name.clone(),
        selector: compile_selector(&rule.selector)?,
        attribute: rule.attribute.clone(),
        pattern: rule.pattern.as_deref().map(Regex::new).transpose()?,
        kind: rule.kind,
        required: rule.required,
    })
}

/// Reads an attribute, or the element's whitespace-collapsed text
fn read_value(element: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    let raw = match attribute {
        Some(name) => element.value().attr(name)?.trim().to_string(),
        None => element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" "),
    };
    (!raw.is_empty()).then_some(raw)
}

/// Keeps capture group 1 (or the whole match) when a pattern is set
fn narrow(raw: &str, pattern: Option<&Regex>) -> Option<String> {
    let Some(pattern) = pattern else {
        return Some(raw.to_string());
    };
    let captures = pattern.captures(raw)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_string())
}

fn convert(raw: &str, kind: FieldKind) -> Option<Value> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();

    match kind {
        FieldKind::Text => Some(Value::from(raw)),
        FieldKind::Date => parse_date(raw).map(|d| Value::from(d.format("%Y-%m-%d").to_string())),
        FieldKind::Number | FieldKind::Integer => {
            let pattern = NUMBER
                .get_or_init(|| Regex::new(r"[-+]?\d*\.?\d+").ok())
                .as_ref()?;
            let cleaned = raw.replace(',', "");
            let digits = pattern.find(&cleaned)?.as_str();
            if kind == FieldKind::Integer {
                digits.parse::<i64>().ok().map(Value::from)
            } else {
                digits
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
        }
    }
}
