//! Debug archive for anomalous pages
//!
//! One file per challenge, ambiguous, end-of-results or failed page, named
//! after the time, the outcome and the target page. The crawler never reads
//! these files back.

use crate::storage::write_atomic;
use chrono::Local;
use std::path::PathBuf;

/// Why a page was archived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveTag {
    Challenge,
    Ambiguous,
    End,
    HttpError,
}

impl ArchiveTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Challenge => "challenge",
            Self::Ambiguous => "ambiguous",
            Self::End => "end",
            Self::HttpError => "http_error",
        }
    }
}

/// Write-only store of page bodies kept for diagnostics
#[derive(Debug, Clone)]
pub struct DebugArchive {
    dir: PathBuf,
}

impl DebugArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Saves a page body; failures are logged and otherwise ignored
    pub fn archive(
        &self,
        tag: ArchiveTag,
        target_label: &str,
        page: u32,
        url: &str,
        body: &str,
    ) -> Option<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = self.dir.join(format!(
            "{}_{}_{}_pg{}.html",
            timestamp,
            tag.as_str(),
            target_label,
            page
        ));

        match write_atomic(&path, body.as_bytes()) {
            Ok(()) => {
                tracing::info!("Archived {} page {} ({})", tag.as_str(), path.display(), url);
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Failed to archive {} page for {}: {}", tag.as_str(), url, e);
                None
            }
        }
    }
}
