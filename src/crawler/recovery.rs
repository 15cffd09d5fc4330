//! Recovery from challenge and ambiguous pages
//!
//! Before the operator is asked anything, progress is flushed and the page is
//! archived, so that any answer (including killing the process) loses no
//! collected data.

use super::fetcher::{Credentials, Fetcher, Jitter};
use super::journal::Journal;
use super::operator::{Operator, OperatorRequest};
use super::PageOutcome;
use crate::storage::{ArchiveTag, DebugArchive};
use crate::target::PageRequest;

/// What the crawl loop does after a recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Fetch the same page again, typically with new credentials
    RetrySamePage,

    /// Finish the current sub-area
    EndTarget,

    /// Stop the whole crawl job
    AbortRun,
}

/// The page being recovered
#[derive(Debug, Clone, Copy)]
pub struct RecoveryContext<'a> {
    pub request: &'a PageRequest,
    pub url: &'a str,
    pub body: &'a str,
}

/// Turns challenge and ambiguous outcomes into a [`RecoveryAction`]
pub struct RecoveryCoordinator {
    operator: Box<dyn Operator>,
    archive: DebugArchive,
    cooldown: Jitter,
}

impl RecoveryCoordinator {
    pub fn new(operator: Box<dyn Operator>, archive: DebugArchive, cooldown: Jitter) -> Self {
        Self {
            operator,
            archive,
            cooldown,
        }
    }

    pub fn archive(&self) -> &DebugArchive {
        &self.archive
    }

    /// Handles one page outcome
    ///
    /// | Outcome | Operator answer | Action |
    /// |---------|-----------------|--------|
    /// | Challenge | valid cookies | store credentials, cool down, `RetrySamePage` |
    /// | Challenge | blank / closed input | `AbortRun` |
    /// | AmbiguousEmpty | `END` (any case) | `EndTarget` |
    /// | AmbiguousEmpty | valid cookies | store credentials, cool down, `RetrySamePage` |
    /// | AmbiguousEmpty | blank / closed input | `AbortRun` |
    ///
    /// Any other answer is rejected and the operator is asked again.
    pub async fn recover(
        &mut self,
        outcome: PageOutcome,
        context: &RecoveryContext<'_>,
        journal: &mut Journal,
        fetcher: &mut Fetcher,
    ) -> RecoveryAction {
        let (tag, ambiguous) = match outcome {
            PageOutcome::Challenge => (ArchiveTag::Challenge, false),
            PageOutcome::AmbiguousEmpty => (ArchiveTag::Ambiguous, true),
            PageOutcome::Content => return RecoveryAction::RetrySamePage,
            PageOutcome::End => return RecoveryAction::EndTarget,
        };

        journal.flush();
        let label = context.request.label();
        let page = context.request.page;
        self.archive
            .archive(tag, &label, page, context.url, context.body);

        let request = if ambiguous {
            OperatorRequest::AmbiguousPage {
                url: context.url,
                target: &label,
                page,
            }
        } else {
            OperatorRequest::Credentials {
                url: context.url,
                target: &label,
                page,
            }
        };

        tracing::warn!("{} page at {}, waiting for operator", outcome, context.url);

        loop {
            let answer = self.operator.prompt(&request).unwrap_or_default();
            let answer = answer.trim();

            if answer.is_empty() {
                tracing::warn!("No operator answer, stopping the crawl");
                return RecoveryAction::AbortRun;
            }

            if ambiguous && answer.eq_ignore_ascii_case("END") {
                tracing::info!("Operator confirmed end of results for {}", label);
                return RecoveryAction::EndTarget;
            }

            match Credentials::parse(answer) {
                Some(credentials) => {
                    fetcher.set_credentials(credentials);
                    let cooldown = self.cooldown.sample();
                    tracing::info!("Cooling down for {:.1}s before retrying", cooldown.as_secs_f64());
                    tokio::time::sleep(cooldown).await;
                    return RecoveryAction::RetrySamePage;
                }
                None => {
                    tracing::warn!("Answer is neither END nor k=v cookie pairs, asking again");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetcherConfig, RecordsConfig};
    use crate::crawler::ScriptedOperator;
    use crate::record::Dataset;
    use crate::state::Checkpoint;
    use crate::storage::JsonStore;
    use crate::target::SubArea;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        journal: Journal,
        fetcher: Fetcher,
        request: PageRequest,
        archive_dir: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("d.json"), dir.path().join("d.ckpt.json"));
        let journal = Journal::new(
            Box::new(store),
            Dataset::new(RecordsConfig::default()),
            Checkpoint::default(),
        );
        let fetcher = Fetcher::new(&FetcherConfig::default(), Jitter::none()).unwrap();
        let sub_area = SubArea {
            name: "陆家嘴".to_string(),
            code: "b01".to_string(),
        };
        let request = PageRequest::new("a025", &sub_area, 3).unwrap();
        let archive_dir = dir.path().join("debug");

        Fixture {
            _dir: dir,
            journal,
            fetcher,
            request,
            archive_dir,
        }
    }

    fn coordinator(answers: &[&str], archive_dir: &std::path::Path) -> RecoveryCoordinator {
        RecoveryCoordinator::new(
            Box::new(ScriptedOperator::new(answers.iter().copied())),
            DebugArchive::new(archive_dir),
            Jitter::none(),
        )
    }

    #[tokio::test]
    async fn test_challenge_with_cookie_retries() {
        let mut f = fixture();
        let mut recovery = coordinator(&["not a cookie", "sid=abc; uid=1"], &f.archive_dir);
        let context = RecoveryContext {
            request: &f.request,
            url: "https://example.com/p3",
            body: "验证码",
        };

        let action = recovery
            .recover(PageOutcome::Challenge, &context, &mut f.journal, &mut f.fetcher)
            .await;

        assert_eq!(action, RecoveryAction::RetrySamePage);
        assert_eq!(f.fetcher.credentials().map(Credentials::len), Some(2));
        assert_eq!(std::fs::read_dir(&f.archive_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_challenge_blank_aborts() {
        let mut f = fixture();
        let mut recovery = coordinator(&[""], &f.archive_dir);
        let context = RecoveryContext {
            request: &f.request,
            url: "https://example.com/p3",
            body: "",
        };

        let action = recovery
            .recover(PageOutcome::Challenge, &context, &mut f.journal, &mut f.fetcher)
            .await;
        assert_eq!(action, RecoveryAction::AbortRun);
        assert!(f.fetcher.credentials().is_none());
    }

    #[tokio::test]
    async fn test_challenge_end_is_not_an_answer() {
        let mut f = fixture();
        let mut recovery = coordinator(&["END"], &f.archive_dir);
        let context = RecoveryContext {
            request: &f.request,
            url: "https://example.com/p3",
            body: "",
        };

        // END is rejected for a challenge; the script then runs dry
        let action = recovery
            .recover(PageOutcome::Challenge, &context, &mut f.journal, &mut f.fetcher)
            .await;
        assert_eq!(action, RecoveryAction::AbortRun);
    }

    #[tokio::test]
    async fn test_ambiguous_end_finishes_target() {
        let mut f = fixture();
        let mut recovery = coordinator(&["end"], &f.archive_dir);
        let context = RecoveryContext {
            request: &f.request,
            url: "https://example.com/p3",
            body: "<html></html>",
        };

        let action = recovery
            .recover(
                PageOutcome::AmbiguousEmpty,
                &context,
                &mut f.journal,
                &mut f.fetcher,
            )
            .await;
        assert_eq!(action, RecoveryAction::EndTarget);
    }

    #[tokio::test]
    async fn test_ambiguous_cookie_retries() {
        let mut f = fixture();
        let mut recovery = coordinator(&["sid=2"], &f.archive_dir);
        let context = RecoveryContext {
            request: &f.request,
            url: "https://example.com/p3",
            body: "<html></html>",
        };

        let action = recovery
            .recover(
                PageOutcome::AmbiguousEmpty,
                &context,
                &mut f.journal,
                &mut f.fetcher,
            )
            .await;
        assert_eq!(action, RecoveryAction::RetrySamePage);
    }

    #[tokio::test]
    async fn test_plain_outcomes_need_no_operator() {
        let mut f = fixture();
        let mut recovery = coordinator(&[], &f.archive_dir);
        let context = RecoveryContext {
            request: &f.request,
            url: "https://example.com/p3",
            body: "",
        };

        assert_eq!(
            recovery
                .recover(PageOutcome::End, &context, &mut f.journal, &mut f.fetcher)
                .await,
            RecoveryAction::EndTarget
        );
        assert_eq!(
            recovery
                .recover(PageOutcome::Content, &context, &mut f.journal, &mut f.fetcher)
                .await,
            RecoveryAction::RetrySamePage
        );
        assert!(!f.archive_dir.exists());
    }
}
