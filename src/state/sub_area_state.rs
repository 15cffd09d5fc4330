//! Sub-area scanning state machine
//!
//! A sub-area is scanned page by page from its start page. Each page result
//! moves the state forward until it reaches `Done` or `Aborted`.
use std::fmt;

/// Why a sub-area finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoneReason {
    /// The site said there are no more results
    EndSignal,

    /// Too many consecutive pages without records
    EmptyThreshold,

    /// The page ceiling was reached
    PageCeiling,

    /// A record older than the date window was seen
    DateCutoff,

    /// The operator confirmed an ambiguous page as the end of results
    OperatorEnd,

    /// A page could not be fetched after retries
    FetchFailed,
}

/// Page-count limits applied while scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    pub max_pages: u32,
    pub max_empty_pages: u32,
}

/// What a content page yielded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTally {
    /// Items the parser turned into raw records
    pub parsed: usize,

    /// Records appended to the dataset after date filtering and dedup
    pub kept: usize,

    /// Items dropped for being newer than the date window
    pub too_new: usize,

    /// Items dropped as already collected
    pub duplicates: usize,

    /// Whether a record older than the date window was seen
    pub cutoff: bool,
}

/// Represents the current state of a sub-area scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAreaState {
    /// Fetching `page`; `consecutive_empty` pages in a row yielded nothing
    Scanning { page: u32, consecutive_empty: u32 },

    /// The sub-area is finished
    Done(DoneReason),

    /// The operator stopped the whole crawl job
    Aborted,
}

impl SubAreaState {
    /// Starts scanning at `page`
    pub fn start(page: u32) -> Self {
        Self::Scanning {
            page,
            consecutive_empty: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Scanning { .. })
    }

    /// Page currently being scanned
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Scanning { page, .. } => Some(*page),
            _ => None,
        }
    }

    /// Applies the result of a content page
    ///
    /// A page with at least one kept record resets the empty counter. A page
    /// where nothing was kept (nothing parsed, or everything filtered out)
    /// counts as empty, and reaching the threshold finishes the sub-area.
    pub fn after_content(self, tally: PageTally, limits: ScanLimits) -> Self {
        let Self::Scanning {
            page,
            consecutive_empty,
        } = self
        else {
            return self;
        };

        let consecutive_empty = if tally.kept > 0 {
            0
        } else {
            consecutive_empty + 1
        };

        if tally.cutoff {
            return Self::Done(DoneReason::DateCutoff);
        }
        if consecutive_empty >= limits.max_empty_pages {
            return Self::Done(DoneReason::EmptyThreshold);
        }
        if page >= limits.max_pages {
            return Self::Done(DoneReason::PageCeiling);
        }

        Self::Scanning {
            page: page + 1,
            consecutive_empty,
        }
    }

    /// Finishes the sub-area unless already terminal
    pub fn finish(self, reason: DoneReason) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::Done(reason)
        }
    }

    pub fn abort(self) -> Self {
        Self::Aborted
    }
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EndSignal => "no more results",
            Self::EmptyThreshold => "empty-page threshold reached",
            Self::PageCeiling => "page ceiling reached",
            Self::DateCutoff => "date cutoff reached",
            Self::OperatorEnd => "end confirmed by operator",
            Self::FetchFailed => "fetch failed",
        };
        f.write_str(text)
    }
}
