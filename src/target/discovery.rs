//! Sub-area discovery and its on-disk cache
//!
//! A region without a static sub-area list is resolved once from its seed
//! page. The resulting list is written to `sub_areas_<code>.json` in the
//! cache directory and reused as-is on every later run; deleting the file
//! forces rediscovery.

use super::{Region, SubArea};
use crate::config::{validate_code, Config};
use crate::crawler::Fetcher;
use crate::storage::{write_atomic, StorageError};
use crate::{HarrowError, TargetError};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Path of the cached sub-area list for a region
pub fn sub_area_cache_path(cache_dir: &Path, region_code: &str) -> PathBuf {
    cache_dir.join(format!("sub_areas_{}.json", region_code))
}

/// Fills in `region.sub_areas` from cache or from the region seed page
///
/// Regions that already carry sub-areas are left untouched. An empty
/// discovery result is not cached, so the next run tries again.
pub async fn load_or_discover(
    region: &mut Region,
    config: &Config,
    fetcher: &Fetcher,
) -> Result<(), HarrowError> {
    if !region.sub_areas.is_empty() {
        return Ok(());
    }

    let cache_path = sub_area_cache_path(Path::new(&config.output.cache_dir), &region.code);
    if cache_path.exists() {
        tracing::info!(
            "Loading sub-areas for {} from cache {}",
            region.name,
            cache_path.display()
        );
        let content = std::fs::read_to_string(&cache_path).map_err(StorageError::from)?;
        region.sub_areas = serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
            path: cache_path.display().to_string(),
            message: e.to_string(),
        })?;
        return Ok(());
    }

    let (Some(seed), Some(pattern)) = (
        config.urls.region_seed.as_deref(),
        config.urls.sub_area_link_pattern.as_deref(),
    ) else {
        return Err(TargetError::Discovery {
            region: region.code.clone(),
            message: "no region-seed configured".to_string(),
        }
        .into());
    };

    let url = seed.replace("{region}", &region.code);
    let pattern = Regex::new(&pattern.replace("{region}", &regex::escape(&region.code)))?;

    tracing::info!("Discovering sub-areas for {} from {}", region.name, url);
    let body = fetcher.fetch(&url).await?;
    let sub_areas = extract_sub_areas(&body, &pattern);

    if sub_areas.is_empty() {
        return Err(TargetError::Discovery {
            region: region.code.clone(),
            message: format!("no sub-area links found at {}", url),
        }
        .into());
    }

    let json = serde_json::to_string_pretty(&sub_areas)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    write_atomic(&cache_path, json.as_bytes())?;
    tracing::info!(
        "Discovered {} sub-areas for {}, cached to {}",
        sub_areas.len(),
        region.name,
        cache_path.display()
    );

    region.sub_areas = sub_areas;
    Ok(())
}

/// Extracts sub-areas from the links of a region seed page
///
/// A link qualifies when its href matches `pattern` (group 1 is the code),
/// the code passes the same check as configured codes, and its text is
/// longer than one character. The first occurrence of each code wins.
pub fn extract_sub_areas(html: &str, pattern: &Regex) -> Vec<SubArea> {
    let document = Html::parse_document(html);
    let Ok(link_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut sub_areas = Vec::new();

    for element in document.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(code) = pattern
            .captures(href)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };
        if let Err(e) = validate_code(&code) {
            tracing::debug!("Skipping sub-area link {}: {}", href, e);
            continue;
        }

        let name = element.text().collect::<String>().trim().to_string();
        if name.chars().count() <= 1 {
            continue;
        }

        if seen.insert(code.clone()) {
            sub_areas.push(SubArea { name, code });
        }
    }

    sub_areas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(region: &str) -> Regex {
        Regex::new(&format!(
            "/chengjiao-{}-([a-z0-9]+)/?$",
            regex::escape(region)
        ))
        .unwrap()
    }

    #[test]
    fn test_extract_sub_areas() {
        let html = r#"<html><body>
            <a href="/chengjiao-a025-b01646/">陆家嘴</a>
            <a href="https://sh.esf.fang.com/chengjiao-a025-b01647/">花木</a>
            <a href="/chengjiao-a025-b01646/">陆家嘴</a>
            <a href="/chengjiao-a019-b0100/">徐家汇</a>
            <a href="/chengjiao-a025-b01648/">不</a>
            <a href="/chengjiao-a025/">浦东</a>
        </body></html>"#;

        let sub_areas = extract_sub_areas(html, &pattern("a025"));

        assert_eq!(
            sub_areas,
            vec![
                SubArea {
                    name: "陆家嘴".to_string(),
                    code: "b01646".to_string()
                },
                SubArea {
                    name: "花木".to_string(),
                    code: "b01647".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_extract_sub_areas_skips_unsafe_codes() {
        let html = r#"<html><body>
            <a href="/chengjiao-a025-../x/">上级</a>
            <a href="/chengjiao-a025-b01/c02/">陆家嘴</a>
            <a href="/chengjiao-a025-b01649/">塘桥</a>
        </body></html>"#;
        let permissive = Regex::new("/chengjiao-a025-(.+)/$").unwrap();

        let sub_areas = extract_sub_areas(html, &permissive);

        assert_eq!(
            sub_areas,
            vec![SubArea {
                name: "塘桥".to_string(),
                code: "b01649".to_string()
            }]
        );
    }

    #[test]
    fn test_extract_sub_areas_no_links() {
        let html = "<html><body><p>nothing here</p></body></html>";
        assert!(extract_sub_areas(html, &pattern("a025")).is_empty());
    }

    #[test]
    fn test_cache_path() {
        let path = sub_area_cache_path(Path::new("/tmp/cache"), "a025");
        assert_eq!(path, PathBuf::from("/tmp/cache/sub_areas_a025.json"));
    }
}
