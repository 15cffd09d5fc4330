//! Crawl orchestrator - main crawl loop
//!
//! The orchestrator walks regions in configured order, the sub-areas of each
//! region in order, and the pages of each sub-area from the start page,
//! driving a [`SubAreaState`] per sub-area. It owns the dataset and the
//! checkpoint through the [`Journal`] and is the only writer of either.
//!
//! Everything is strictly sequential: one request in flight at a time, with
//! the politeness delay and any operator prompt blocking the loop.

use super::classifier::{PageClassifier, PageOutcome};
use super::fetcher::{Fetcher, Jitter};
use super::journal::Journal;
use super::operator::Operator;
use super::recovery::{RecoveryAction, RecoveryContext, RecoveryCoordinator};
use crate::config::Config;
use crate::output::{RunReport, RunStatus};
use crate::record::{Dataset, ParseContext, Record, RecordParser};
use crate::state::{Checkpoint, DoneReason, PageTally, ResumePosition, ScanLimits, SubAreaState};
use crate::storage::{ArchiveTag, DebugArchive, JsonStore, Store};
use crate::target::{configured_regions, load_or_discover, PageRequest, Region, SubArea};
use crate::HarrowError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// How the walk over one region ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionEnd {
    Finished,
    Aborted,
    Interrupted,
}

/// Main crawler structure
pub struct Orchestrator {
    config: Config,
    fetcher: Fetcher,
    classifier: PageClassifier,
    parser: Box<dyn RecordParser>,
    recovery: RecoveryCoordinator,
    journal: Journal,
    resume: Option<ResumePosition>,
    shutdown: Arc<AtomicBool>,
    report: RunReport,
}

impl Orchestrator {
    /// Creates an orchestrator persisting to the configured JSON files
    pub fn new(
        config: Config,
        parser: Box<dyn RecordParser>,
        operator: Box<dyn Operator>,
    ) -> Result<Self, HarrowError> {
        let store = JsonStore::new(&config.output.snapshot_path, &config.output.checkpoint_path);
        Self::with_store(config, Box::new(store), parser, operator)
    }

    /// Creates an orchestrator on top of any [`Store`]
    ///
    /// The snapshot is loaded and the seen-set rebuilt before anything is
    /// fetched. An unreadable snapshot is an error: overwriting it would
    /// lose collected data. An unreadable checkpoint only costs the resume
    /// position, so it is logged and ignored.
    pub fn with_store(
        config: Config,
        store: Box<dyn Store>,
        parser: Box<dyn RecordParser>,
        operator: Box<dyn Operator>,
    ) -> Result<Self, HarrowError> {
        let records = store.load_snapshot()?;
        let dataset = Dataset::from_records(records, config.records.clone());

        let checkpoint = match store.load_checkpoint() {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!("Ignoring unreadable checkpoint, starting from the beginning: {}", e);
                None
            }
        };
        let resume = checkpoint.as_ref().and_then(Checkpoint::position);
        let checkpoint = checkpoint.unwrap_or_default();

        tracing::info!(
            "Loaded {} records ({} distinct IDs)",
            dataset.len(),
            dataset.seen_count()
        );
        if let Some(position) = &resume {
            tracing::info!(
                "Resuming region {} at sub-area #{} page {}",
                position.region_code,
                position.sub_area_index,
                position.next_page.unwrap_or(config.crawler.start_page)
            );
        }

        let crawler = &config.crawler;
        let fetcher = Fetcher::new(
            &config.fetcher,
            Jitter::new(crawler.delay_min_secs, crawler.delay_max_secs),
        )?;
        let classifier = PageClassifier::new(&config.classifier)?;
        let recovery = RecoveryCoordinator::new(
            operator,
            DebugArchive::new(&config.output.debug_dir),
            Jitter::new(crawler.cooldown_min_secs, crawler.cooldown_max_secs),
        );

        Ok(Self {
            fetcher,
            classifier,
            parser,
            recovery,
            journal: Journal::new(store, dataset, checkpoint),
            resume,
            shutdown: Arc::new(AtomicBool::new(false)),
            report: RunReport::default(),
            config,
        })
    }

    /// Records the configuration hash in the checkpoint
    ///
    /// Resuming under a different configuration is allowed but logged.
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        let checkpoint = self.journal.checkpoint_mut();
        if let Some(previous) = &checkpoint.config_hash {
            if *previous != hash {
                tracing::warn!(
                    "Configuration changed since the checkpoint was written ({} -> {})",
                    previous,
                    hash
                );
            }
        }
        checkpoint.config_hash = Some(hash);
        self
    }

    /// Starts from the first region regardless of the stored checkpoint
    ///
    /// The snapshot is still used, so nothing already collected is added
    /// twice.
    pub fn ignore_checkpoint(mut self) -> Self {
        if self.resume.take().is_some() {
            tracing::info!("Ignoring stored checkpoint, starting from the first region");
        }
        self
    }

    /// Get a shutdown handle for a cooperative stop.
    ///
    /// Call `store(true, Ordering::SeqCst)` on the returned Arc; the crawl
    /// flushes and returns at the next page boundary.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn dataset(&self) -> &Dataset {
        self.journal.dataset()
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        self.journal.checkpoint()
    }

    /// Run until done, or until Ctrl+C
    ///
    /// The first Ctrl+C requests a cooperative stop. A second one exits the
    /// process at once; state was already flushed before any blocking
    /// operator prompt, and every page flush is atomic.
    pub async fn run_until_shutdown(&mut self) -> Result<RunReport, HarrowError> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("Interrupt received, stopping after the current page (Ctrl+C again to exit now)");
            shutdown.store(true, Ordering::SeqCst);

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Second interrupt, exiting immediately");
                std::process::exit(130);
            }
        });

        self.run().await
    }

    /// Runs the crawl over every configured region
    ///
    /// Fatal page errors end only their sub-area and show up in the report.
    /// The returned error is reserved for failures before crawling starts.
    pub async fn run(&mut self) -> Result<RunReport, HarrowError> {
        let started = Instant::now();
        let regions = configured_regions(&self.config);
        let resume = self.resume.take();

        let first_region = match &resume {
            Some(position) => match regions.iter().position(|r| r.code == position.region_code) {
                Some(index) => index,
                None => {
                    tracing::warn!(
                        "Checkpoint region {} is no longer configured, starting from the beginning",
                        position.region_code
                    );
                    0
                }
            },
            None => 0,
        };

        tracing::info!(
            "Starting crawl: {} regions, {} records already collected",
            regions.len(),
            self.journal.dataset().len()
        );

        let mut status = RunStatus::Completed;

        for (index, mut region) in regions.into_iter().enumerate().skip(first_region) {
            if self.is_shutdown_requested() {
                status = RunStatus::Interrupted;
                break;
            }

            let (first_sub_area, first_page) = match &resume {
                Some(position) if index == first_region && position.region_code == region.code => {
                    (position.sub_area_index, position.next_page)
                }
                _ => (0, None),
            };

            if let Err(e) = load_or_discover(&mut region, &self.config, &self.fetcher).await {
                tracing::warn!("Skipping region {} ({}): {}", region.name, region.code, e);
                self.report.failure(&region.code, None, e.to_string());
                continue;
            }

            match self.crawl_region(&region, first_sub_area, first_page).await {
                RegionEnd::Finished => {
                    tracing::info!(
                        "Region {} ({}) complete, {} records in total",
                        region.name,
                        region.code,
                        self.journal
                            .checkpoint()
                            .per_region_counts
                            .get(&region.code)
                            .copied()
                            .unwrap_or(0)
                    );
                    self.journal.checkpoint_mut().clear_position();
                    self.journal.flush();
                }
                RegionEnd::Aborted => {
                    status = RunStatus::Aborted;
                    break;
                }
                RegionEnd::Interrupted => {
                    status = RunStatus::Interrupted;
                    break;
                }
            }
        }

        // Final flush on every exit path
        self.journal.flush();

        self.report.status = status;
        self.report.persistence_failures = self.journal.persistence_failures();
        self.report.dataset_size = self.journal.dataset().len();

        tracing::info!(
            "Crawl {}: {} pages fetched, {} records added in {:?}",
            status,
            self.report.pages_fetched,
            self.report.records_added,
            started.elapsed()
        );

        Ok(self.report.clone())
    }

    async fn crawl_region(
        &mut self,
        region: &Region,
        first_sub_area: usize,
        first_page: Option<u32>,
    ) -> RegionEnd {
        let start_page = self.config.crawler.start_page;
        let limit = self
            .config
            .crawler
            .max_sub_areas_per_region
            .unwrap_or(usize::MAX);

        if first_sub_area >= region.sub_areas.len() {
            tracing::info!("No sub-areas left in region {}", region.code);
            return RegionEnd::Finished;
        }

        for (index, sub_area) in region
            .sub_areas
            .iter()
            .enumerate()
            .skip(first_sub_area)
            .take(limit)
        {
            let page = if index == first_sub_area {
                first_page.unwrap_or(start_page)
            } else {
                start_page
            };

            match self.crawl_sub_area(region, index, sub_area, page).await {
                SubAreaState::Done(reason) => {
                    self.report.sub_area_done(reason);
                    self.journal
                        .checkpoint_mut()
                        .set_position(&region.code, index + 1, start_page);
                    self.journal.flush();
                }
                SubAreaState::Aborted => return RegionEnd::Aborted,
                SubAreaState::Scanning { .. } => return RegionEnd::Interrupted,
            }
        }

        RegionEnd::Finished
    }

    /// Scans one sub-area until it reaches a terminal state
    ///
    /// A non-terminal return value means a stop was requested; the
    /// checkpoint then points at the page that was about to be fetched.
    async fn crawl_sub_area(
        &mut self,
        region: &Region,
        index: usize,
        sub_area: &SubArea,
        start_page: u32,
    ) -> SubAreaState {
        let limits = ScanLimits {
            max_pages: self.config.crawler.max_pages_per_sub_area,
            max_empty_pages: self.config.crawler.max_empty_pages,
        };
        let save_every = self.config.crawler.save_every_pages.max(1);
        let mut unsaved_pages = 0u32;

        tracing::info!(
            "Crawling {} / {} ({}-{}) from page {}",
            region.name,
            sub_area.name,
            region.code,
            sub_area.code,
            start_page
        );

        let mut state = SubAreaState::start(start_page);

        while let Some(page) = state.page() {
            if self.is_shutdown_requested() {
                self.journal
                    .checkpoint_mut()
                    .set_position(&region.code, index, page);
                self.journal.flush();
                return state;
            }

            let request = match PageRequest::new(&region.code, sub_area, page) {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!("Cannot build request for {}: {}", sub_area.code, e);
                    self.report.failure(&sub_area.code, Some(page), e.to_string());
                    return state.finish(DoneReason::FetchFailed);
                }
            };
            let url = request.url(&self.config.urls);
            let label = request.label();

            let body = match self.fetcher.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!("Giving up on {} page {}: {}", label, page, e);
                    self.recovery.archive().archive(
                        ArchiveTag::HttpError,
                        &label,
                        page,
                        &url,
                        e.body().unwrap_or_default(),
                    );
                    self.report.failure(&label, Some(page), e.to_string());
                    self.journal
                        .checkpoint_mut()
                        .set_position(&region.code, index, page);
                    self.journal.flush();
                    state = state.finish(DoneReason::FetchFailed);
                    break;
                }
            };
            self.report.pages_fetched += 1;

            match self.classifier.classify(&body, page) {
                PageOutcome::Content => {
                    let tally = self.ingest(region, sub_area, page, &url, &body);
                    tracing::info!(
                        "{} page {}: {} parsed, {} kept, {} duplicates, {} too new{}",
                        label,
                        page,
                        tally.parsed,
                        tally.kept,
                        tally.duplicates,
                        tally.too_new,
                        if tally.cutoff { ", date cutoff reached" } else { "" }
                    );

                    state = state.after_content(tally, limits);
                    self.journal
                        .checkpoint_mut()
                        .set_position(&region.code, index, page + 1);

                    unsaved_pages += 1;
                    if unsaved_pages >= save_every {
                        self.journal.flush();
                        unsaved_pages = 0;
                    }
                }
                PageOutcome::End => {
                    self.recovery
                        .archive()
                        .archive(ArchiveTag::End, &label, page, &url, &body);
                    state = state.finish(DoneReason::EndSignal);
                }
                outcome @ (PageOutcome::Challenge | PageOutcome::AmbiguousEmpty) => {
                    // The page is fetched again on resume
                    self.journal
                        .checkpoint_mut()
                        .set_position(&region.code, index, page);

                    let context = RecoveryContext {
                        request: &request,
                        url: &url,
                        body: &body,
                    };
                    let action = self
                        .recovery
                        .recover(outcome, &context, &mut self.journal, &mut self.fetcher)
                        .await;

                    match action {
                        RecoveryAction::RetrySamePage => {
                            tracing::info!("Retrying {} page {}", label, page);
                        }
                        RecoveryAction::EndTarget => {
                            state = state.finish(DoneReason::OperatorEnd);
                        }
                        RecoveryAction::AbortRun => {
                            state = state.abort();
                        }
                    }
                }
            }
        }

        match state {
            SubAreaState::Done(reason) => {
                tracing::info!("Sub-area {} / {} done: {}", region.name, sub_area.name, reason);
            }
            SubAreaState::Aborted => {
                tracing::warn!("Crawl aborted in {} / {}", region.name, sub_area.name);
            }
            SubAreaState::Scanning { .. } => {}
        }

        state
    }

    /// Parses a content page and appends the new records
    ///
    /// Records dated before `min-date` are dropped and flag the date cutoff;
    /// records after `max-date` are dropped without stopping. Records with no
    /// readable date are kept.
    fn ingest(
        &mut self,
        region: &Region,
        sub_area: &SubArea,
        page: u32,
        url: &str,
        body: &str,
    ) -> PageTally {
        let context = ParseContext {
            region_name: &region.name,
            region_code: &region.code,
            sub_area_name: &sub_area.name,
            sub_area_code: &sub_area.code,
            page,
            url,
        };
        let min_date = self.config.crawler.min_date;
        let max_date = self.config.crawler.max_date;
        let date_field = self.config.records.date_field.clone();

        let mut tally = PageTally::default();

        for item in self.parser.parse(body, &context) {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::debug!("Dropping item on {} page {}: {}", sub_area.code, page, e);
                    continue;
                }
            };
            tally.parsed += 1;
            let record = Record::new(raw);

            if let Some(date) = date_field.as_deref().and_then(|field| record.date(field)) {
                if min_date.is_some_and(|min| date < min) {
                    tally.cutoff = true;
                    continue;
                }
                if max_date.is_some_and(|max| date > max) {
                    tally.too_new += 1;
                    continue;
                }
            }

            if self.journal.insert(record) {
                tally.kept += 1;
            } else {
                tally.duplicates += 1;
            }
        }

        let kept = tally.kept as u64;
        self.journal.checkpoint_mut().add_records(&region.code, kept);
        self.report.record_added(&region.code, kept);

        tally
    }
}
