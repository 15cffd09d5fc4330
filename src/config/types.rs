use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Harrow
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    pub urls: UrlConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub parser: Option<ParserConfig>,
    #[serde(default, rename = "region")]
    pub regions: Vec<RegionEntry>,
}

/// Crawl loop behaviour: ceilings, thresholds, date window, pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Highest page index fetched per sub-area
    pub max_pages_per_sub_area: u32,

    /// Consecutive empty pages after which a sub-area is assumed exhausted
    pub max_empty_pages: u32,

    /// First page index of a fresh sub-area
    pub start_page: u32,

    /// Flush snapshot and checkpoint every N content pages
    pub save_every_pages: u32,

    /// Number of sub-areas crawled per region, counted from the resume index
    pub max_sub_areas_per_region: Option<usize>,

    /// Records dated before this stop the sub-area
    pub min_date: Option<NaiveDate>,

    /// Records dated after this are dropped without stopping
    pub max_date: Option<NaiveDate>,

    /// Politeness delay bounds in seconds, sampled after every successful fetch
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,

    /// Cooldown bounds in seconds after an operator credential update
    pub cooldown_min_secs: f64,
    pub cooldown_max_secs: f64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages_per_sub_area: 50,
            max_empty_pages: 12,
            start_page: 1,
            save_every_pages: 1,
            max_sub_areas_per_region: None,
            min_date: None,
            max_date: None,
            delay_min_secs: 1.5,
            delay_max_secs: 3.0,
            cooldown_min_secs: 2.0,
            cooldown_max_secs: 4.0,
        }
    }
}

/// HTTP session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetcherConfig {
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Total attempts per GET, including the first
    pub max_attempts: u32,

    /// Backoff before retry n is `backoff_base_ms * 2^(n-1)`
    pub backoff_base_ms: u64,

    /// Pool of User-Agent strings, one picked per request
    pub user_agents: Vec<String>,

    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Outbound proxies; empty means direct connection
    pub proxies: Vec<String>,

    /// Initial cookie string (`k=v; k2=v2`)
    pub cookie: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        );
        headers.insert(
            "Accept-Language".to_string(),
            "zh-CN,zh;q=0.9".to_string(),
        );

        Self {
            timeout_secs: 25,
            max_attempts: 4,
            backoff_base_ms: 800,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            ],
            headers,
            proxies: Vec::new(),
            cookie: None,
        }
    }
}

/// URL templates mapping targets to pages
///
/// Placeholders: `{region}`, `{sub_area}`, `{page}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UrlConfig {
    /// URL of page 1 of a sub-area
    pub first_page: String,

    /// URL of page N > 1 of a sub-area
    pub next_page: String,

    /// Seed page listing a region's sub-areas (used for discovery)
    #[serde(default)]
    pub region_seed: Option<String>,

    /// Regex matched against link hrefs on the seed page; group 1 is the sub-area code
    #[serde(default)]
    pub sub_area_link_pattern: Option<String>,
}

/// Marker sets for page outcome classification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClassifierConfig {
    /// CSS selector proving a results list is present
    pub results_selector: String,

    /// Case-insensitive phrases meaning "no results for this query"
    pub end_markers: Vec<String>,

    /// Regex matched against element class names meaning "no results"
    pub end_class_pattern: String,

    /// Phrases indicating human verification or rate limiting
    pub challenge_markers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            results_selector: "div.houseList".to_string(),
            end_markers: [
                "没有找到符合条件的房源",
                "没有找到相关房源",
                "抱歉，没有找到",
                "暂无相关房源",
                "暂无房源",
                "no-result",
                "noresult",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            end_class_pattern: "(?i)no[-_]?result".to_string(),
            challenge_markers: [
                "访问验证",
                "安全验证",
                "人机验证",
                "验证码",
                "异常访问",
                "操作太频繁",
                "系统繁忙",
                "请输入验证码",
                "滑动验证",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Field names the crawler itself interprets
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RecordsConfig {
    /// Stable record identifier, the dedup key
    pub id_field: String,

    /// Used as the dedup key when `id_field` is absent (typically a detail URL)
    pub fallback_id_field: Option<String>,

    /// Date used by the date-range policy
    pub date_field: Option<String>,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            id_field: "house_id".to_string(),
            fallback_id_field: Some("detail_url".to_string()),
            date_field: Some("deal_date".to_string()),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Path to the dataset snapshot (JSON array)
    pub snapshot_path: String,

    /// Path to the resume checkpoint (JSON object)
    pub checkpoint_path: String,

    /// Directory receiving anomalous page bodies
    pub debug_dir: String,

    /// Directory receiving discovered sub-area lists
    pub cache_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "./harrow.json".to_string(),
            checkpoint_path: "./harrow.checkpoint.json".to_string(),
            debug_dir: "./harrow_debug_html".to_string(),
            cache_dir: ".".to_string(),
        }
    }
}

/// Selector rules for the built-in record parser
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParserConfig {
    /// Selector matching one element per record
    pub item_selector: String,

    #[serde(default, rename = "field")]
    pub fields: Vec<FieldRule>,
}

/// How to extract one named field from an item element
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldRule {
    pub name: String,

    /// Selector relative to the item element
    pub selector: String,

    /// Attribute to read instead of the element text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Regex applied to the raw value; capture group 1 (or the whole match) is kept
    #[serde(default)]
    pub pattern: Option<String>,

    #[serde(default)]
    pub kind: FieldKind,

    /// Drop the item when this field cannot be extracted
    #[serde(default)]
    pub required: bool,
}

/// Value type of an extracted field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Integer,
    Date,
}

/// A region with its optional static sub-area list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegionEntry {
    pub name: String,
    pub code: String,

    /// When present, discovery is skipped for this region
    #[serde(default, rename = "sub-area")]
    pub sub_areas: Option<Vec<SubAreaEntry>>,
}

/// A statically configured sub-area
#[derive(Debug, Clone, Deserialize)]
pub struct SubAreaEntry {
    pub name: String,
    pub code: String,
}
