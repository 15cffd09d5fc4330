//! Crawl targets
//!
//! Targets form an ordered two-level hierarchy: a [`Region`] owns a list of
//! [`SubArea`]s, and a sub-area is paginated by a [`PageRequest`]. Sub-area
//! lists come either from configuration or from a one-time discovery pass
//! whose result is cached on disk.

mod discovery;

pub use discovery::{extract_sub_areas, load_or_discover, sub_area_cache_path};

use crate::config::{Config, RegionEntry, UrlConfig};
use crate::TargetError;
use serde::{Deserialize, Serialize};

/// A sub-area: the finest unit of pagination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubArea {
    pub name: String,
    pub code: String,
}

/// A region owning its ordered sub-areas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub code: String,
    pub sub_areas: Vec<SubArea>,
}

impl Region {
    /// Builds a region from its config entry, keeping static sub-areas if given
    pub fn from_entry(entry: &RegionEntry) -> Self {
        Self {
            name: entry.name.clone(),
            code: entry.code.clone(),
            sub_areas: entry
                .sub_areas
                .iter()
                .flatten()
                .map(|s| SubArea {
                    name: s.name.clone(),
                    code: s.code.clone(),
                })
                .collect(),
        }
    }
}

/// One page of one sub-area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub region_code: String,
    pub sub_area: SubArea,
    pub page: u32,
}

impl PageRequest {
    /// Creates a request; page indices start at 1
    pub fn new(region_code: &str, sub_area: &SubArea, page: u32) -> Result<Self, TargetError> {
        if page < 1 {
            return Err(TargetError::InvalidPage(page));
        }
        Ok(Self {
            region_code: region_code.to_string(),
            sub_area: sub_area.clone(),
            page,
        })
    }

    /// Resolves this request to a URL
    pub fn url(&self, templates: &UrlConfig) -> String {
        page_url(templates, &self.region_code, &self.sub_area.code, self.page)
    }

    /// Short label used in logs and debug archive file names
    pub fn label(&self) -> String {
        format!("{}-{}", self.region_code, self.sub_area.code)
    }
}

/// Maps a target and page index to a URL
///
/// Page 1 uses the `first-page` template; every later page uses `next-page`.
/// The result depends only on the arguments.
pub fn page_url(templates: &UrlConfig, region_code: &str, sub_area_code: &str, page: u32) -> String {
    let template = if page <= 1 {
        &templates.first_page
    } else {
        &templates.next_page
    };

    template
        .replace("{region}", region_code)
        .replace("{sub_area}", sub_area_code)
        .replace("{page}", &page.to_string())
}

/// Builds the region list in configured order, without any discovery
pub fn configured_regions(config: &Config) -> Vec<Region> {
    config.regions.iter().map(Region::from_entry).collect()
}
