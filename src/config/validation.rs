use crate::config::types::{
    ClassifierConfig, Config, CrawlerConfig, FetcherConfig, ParserConfig, RegionEntry,
    UrlConfig,
};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_url_config(&config.urls)?;
    validate_classifier_config(&config.classifier)?;
    if config.output.snapshot_path == config.output.checkpoint_path {
        return Err(ConfigError::Validation(
            "snapshot-path and checkpoint-path must differ".to_string(),
        ));
    }
    if let Some(parser) = &config.parser {
        validate_parser_config(parser)?;
    }
    validate_regions(&config.regions, &config.urls)?;
    Ok(())
}

/// Validates crawl loop configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages_per_sub_area < 1 {
        return Err(ConfigError::Validation(
            "max-pages-per-sub-area must be >= 1".to_string(),
        ));
    }

    if config.max_empty_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-empty-pages must be >= 1, got {}",
            config.max_empty_pages
        )));
    }

    if config.start_page < 1 || config.start_page > config.max_pages_per_sub_area {
        return Err(ConfigError::Validation(format!(
            "start-page must be between 1 and {}, got {}",
            config.max_pages_per_sub_area, config.start_page
        )));
    }

    if config.save_every_pages < 1 {
        return Err(ConfigError::Validation(
            "save-every-pages must be >= 1".to_string(),
        ));
    }

    if config.max_sub_areas_per_region == Some(0) {
        return Err(ConfigError::Validation(
            "max-sub-areas-per-region must be >= 1 when set".to_string(),
        ));
    }

    if let (Some(min), Some(max)) = (config.min_date, config.max_date) {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "min-date {} is after max-date {}",
                min, max
            )));
        }
    }

    validate_interval("delay", config.delay_min_secs, config.delay_max_secs)?;
    validate_interval("cooldown", config.cooldown_min_secs, config.cooldown_max_secs)?;

    Ok(())
}

/// Validates a `[min, max]` interval in seconds
fn validate_interval(name: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
        return Err(ConfigError::Validation(format!(
            "{name} interval must satisfy 0 <= min <= max, got [{min}, {max}]"
        )));
    }
    Ok(())
}

/// Validates HTTP session configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.user_agents.iter().all(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one non-empty entry".to_string(),
        ));
    }

    for proxy in &config.proxies {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates the URL templates and the discovery pattern
fn validate_url_config(config: &UrlConfig) -> Result<(), ConfigError> {
    validate_template("first-page", &config.first_page, &["{sub_area}"])?;
    validate_template("next-page", &config.next_page, &["{sub_area}", "{page}"])?;

    match (&config.region_seed, &config.sub_area_link_pattern) {
        (Some(seed), Some(pattern)) => {
            validate_template("region-seed", seed, &["{region}"])?;
            let compiled = Regex::new(&pattern.replace("{region}", "a0"))
                .map_err(|e| ConfigError::Validation(format!("Invalid sub-area-link-pattern: {e}")))?;
            if compiled.captures_len() < 2 {
                return Err(ConfigError::Validation(
                    "sub-area-link-pattern must contain a capture group for the sub-area code"
                        .to_string(),
                ));
            }
        }
        (None, None) => {}
        _ => {
            return Err(ConfigError::Validation(
                "region-seed and sub-area-link-pattern must be set together".to_string(),
            ))
        }
    }

    Ok(())
}

/// Checks that a template carries its placeholders and yields a valid URL
fn validate_template(name: &str, template: &str, required: &[&str]) -> Result<(), ConfigError> {
    for placeholder in required {
        if !template.contains(placeholder) {
            return Err(ConfigError::InvalidTemplate(format!(
                "{name} template '{template}' is missing {placeholder}"
            )));
        }
    }

    let sample = template
        .replace("{region}", "r1")
        .replace("{sub_area}", "s1")
        .replace("{page}", "2");
    Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("{name} template '{template}': {e}")))?;

    Ok(())
}

/// Validates classifier markers
fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    validate_selector("results-selector", &config.results_selector)?;

    Regex::new(&config.end_class_pattern)
        .map_err(|e| ConfigError::Validation(format!("Invalid end-class-pattern: {e}")))?;

    if config.end_markers.iter().any(|m| m.is_empty())
        || config.challenge_markers.iter().any(|m| m.is_empty())
    {
        return Err(ConfigError::Validation(
            "classifier markers cannot be empty strings".to_string(),
        ));
    }

    Ok(())
}

/// Validates selector-parser rules
fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    validate_selector("item-selector", &config.item_selector)?;

    let mut names = HashSet::new();
    for field in &config.fields {
        if field.name.is_empty() {
            return Err(ConfigError::Validation(
                "parser field name cannot be empty".to_string(),
            ));
        }
        if !names.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate parser field '{}'",
                field.name
            )));
        }
        validate_selector(&field.name, &field.selector)?;
        if let Some(pattern) = &field.pattern {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("Invalid pattern for field '{}': {e}", field.name))
            })?;
        }
    }

    Ok(())
}

fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("Invalid selector for {name}: {e:?}")))
}

/// Validates the target list
fn validate_regions(regions: &[RegionEntry], urls: &UrlConfig) -> Result<(), ConfigError> {
    if regions.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[region]] is required".to_string(),
        ));
    }

    let mut codes = HashSet::new();
    for region in regions {
        validate_code(&region.code)?;
        if !codes.insert(region.code.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate region code '{}'",
                region.code
            )));
        }

        match &region.sub_areas {
            Some(sub_areas) => {
                let mut sub_codes = HashSet::new();
                for sub_area in sub_areas {
                    validate_code(&sub_area.code)?;
                    if !sub_codes.insert(sub_area.code.as_str()) {
                        return Err(ConfigError::Validation(format!(
                            "duplicate sub-area code '{}' in region '{}'",
                            sub_area.code, region.code
                        )));
                    }
                }
            }
            None if urls.region_seed.is_none() => {
                return Err(ConfigError::Validation(format!(
                    "region '{}' has no sub-areas and no region-seed is configured for discovery",
                    region.code
                )));
            }
            None => {}
        }
    }

    Ok(())
}

/// Codes end up in URLs and file names: ASCII alphanumerics, '-' and '_' only
pub fn validate_code(code: &str) -> Result<(), ConfigError> {
    if code.is_empty()
        || !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "invalid target code '{}'",
            code
        )));
    }
    Ok(())
}
