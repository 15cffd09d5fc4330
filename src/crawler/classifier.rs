//! Page outcome classification
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. A results container is present → [`PageOutcome::Content`]
//! 2. A "no results" phrase or class marker is present → [`PageOutcome::End`]
//! 3. A verification / rate-limit phrase is present → [`PageOutcome::Challenge`]
//! 4. Otherwise → [`PageOutcome::AmbiguousEmpty`]
//!
//! End must be checked before challenge: the two call for opposite actions
//! (finish the sub-area vs. pause and recover), and result-less pages often
//! carry generic verification wording in shared page chrome.

use crate::config::ClassifierConfig;
use crate::HarrowError;
use regex::Regex;
use scraper::{Html, Selector};
use std::fmt;

/// What a fetched page turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageOutcome {
    /// A results list is present
    Content,

    /// The site explicitly reports no more results
    End,

    /// Anti-automation verification is required
    Challenge,

    /// No results, no end signal, no challenge signal
    AmbiguousEmpty,
}

impl fmt::Display for PageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Content => "content",
            Self::End => "end",
            Self::Challenge => "challenge",
            Self::AmbiguousEmpty => "ambiguous-empty",
        };
        f.write_str(text)
    }
}

/// Deterministic rule-based classifier
pub struct PageClassifier {
    results: Selector,
    classed: Selector,
    end_markers: Vec<String>,
    end_class: Regex,
    challenge_markers: Vec<String>,
}

impl PageClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, HarrowError> {
        let results = Selector::parse(&config.results_selector).map_err(|e| HarrowError::Selector {
            selector: config.results_selector.clone(),
            message: format!("{:?}", e),
        })?;
        let classed = Selector::parse("[class]").map_err(|e| HarrowError::Selector {
            selector: "[class]".to_string(),
            message: format!("{:?}", e),
        })?;

        Ok(Self {
            results,
            classed,
            end_markers: config.end_markers.iter().map(|m| m.to_lowercase()).collect(),
            end_class: Regex::new(&config.end_class_pattern)?,
            challenge_markers: config.challenge_markers.clone(),
        })
    }

    /// Labels a page body
    pub fn classify(&self, body: &str, page: u32) -> PageOutcome {
        let document = Html::parse_document(body);

        let outcome = if document.select(&self.results).next().is_some() {
            PageOutcome::Content
        } else if self.looks_like_end(&document, body) {
            PageOutcome::End
        } else if self.challenge_markers.iter().any(|m| body.contains(m.as_str())) {
            PageOutcome::Challenge
        } else {
            PageOutcome::AmbiguousEmpty
        };

        tracing::debug!("Page {} classified as {}", page, outcome);
        outcome
    }

    fn looks_like_end(&self, document: &Html, body: &str) -> bool {
        let lowered = body.to_lowercase();
        if self.end_markers.iter().any(|m| lowered.contains(m.as_str())) {
            return true;
        }

        document.select(&self.classed).any(|element| {
            element
                .value()
                .attr("class")
                .is_some_and(|class| self.end_class.is_match(class))
        })
    }
}
