//! The polling loop that turns marketplace search results into notifications.
//!
//! The loop is a small state machine. `step` performs one transition, `run`
//! keeps stepping until the shutdown channel fires. Shutdown is only observed
//! while waiting and between candidates, so a ledger write in progress always
//! completes.

use discord_notifier::Notifier;
use futures::FutureExt;
use monitor_core::{
    CoreError, ErrorExt, ErrorRecovery, ErrorReporter, Listing, RecoveryStrategy, RunConfig,
    DEFAULT_BACKOFF,
};
use seen_store::SeenStore;
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vinted_client::{
    candidate_id, normalize, Credential, ListingFetcher, MarketplaceClient, SessionManager,
};

/// State the loop resumes after a [`MonitorState::BackoffWait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Authenticating,
    Polling,
}

impl From<Resume> for MonitorState {
    fn from(resume: Resume) -> Self {
        match resume {
            Resume::Authenticating => MonitorState::Authenticating,
            Resume::Polling => MonitorState::Polling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Unauthenticated,
    Authenticating,
    Polling,
    Sleeping,
    BackoffWait { delay: Duration, resume: Resume },
}

/// Counters for one pass over all search terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub terms: usize,
    pub candidates: usize,
    pub skipped_seen: usize,
    pub fetch_failures: usize,
    pub invalid: usize,
    pub filtered: usize,
    pub recorded: usize,
    pub notified: usize,
    pub failures: usize,
}

#[derive(Debug)]
enum CandidateOutcome {
    SkippedSeen,
    FetchFailed,
    Invalid,
    Filtered,
    RecordFailed,
    Notified,
    NotifyFailed,
}

#[derive(Debug)]
enum CycleEnd {
    Completed,
    Reauthenticate,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Only listings whose seller country equals the configured one pass.
pub fn passes_country_filter(listing: &Listing, country_filter: &str) -> bool {
    listing.country == country_filter
}

pub struct MonitorLoop<C, S, N> {
    fetcher: ListingFetcher<C>,
    session: SessionManager,
    store: S,
    notifier: N,
    config: RunConfig,
    state: MonitorState,
    reporter: ErrorReporter,
    last_report: Option<CycleReport>,
}

impl<C, S, N> MonitorLoop<C, S, N>
where
    C: MarketplaceClient,
    S: SeenStore,
    N: Notifier,
{
    pub fn new(client: C, store: S, notifier: N, config: RunConfig) -> Self {
        Self::with_session(client, SessionManager::new(), store, notifier, config)
    }

    pub fn with_session(
        client: C,
        session: SessionManager,
        store: S,
        notifier: N,
        config: RunConfig,
    ) -> Self {
        Self {
            fetcher: ListingFetcher::new(client),
            session,
            store,
            notifier,
            config,
            state: MonitorState::Unauthenticated,
            reporter: ErrorReporter::new(),
            last_report: None,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn client(&self) -> &C {
        self.fetcher.client()
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Perform one transition and return the state entered.
    pub async fn step(&mut self) -> MonitorState {
        let (_shutdown_tx, mut shutdown) = watch::channel(false);
        self.advance(&mut shutdown).await;
        self.state.clone()
    }

    /// Step until `shutdown` carries `true` or its sender goes away.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            terms = self.config.search_terms.len(),
            interval_secs = self.config.refresh_delay,
            country = %self.config.country_filter,
            "Starting monitor loop"
        );

        while self.advance(&mut shutdown).await == Flow::Continue {}

        info!("Monitor loop stopped");
    }

    async fn advance(&mut self, shutdown: &mut watch::Receiver<bool>) -> Flow {
        if *shutdown.borrow() {
            return Flow::Shutdown;
        }

        match self.state.clone() {
            MonitorState::Unauthenticated => {
                self.state = MonitorState::Authenticating;
            }
            MonitorState::Authenticating => self.authenticate().await,
            MonitorState::Polling => {
                let result = AssertUnwindSafe(self.poll_cycle(shutdown))
                    .catch_unwind()
                    .await;
                match result {
                    Ok(CycleEnd::Completed) => self.state = MonitorState::Sleeping,
                    // A fresh token is requested one poll interval later
                    Ok(CycleEnd::Reauthenticate) => {
                        self.state = MonitorState::BackoffWait {
                            delay: self.config.poll_interval(),
                            resume: Resume::Authenticating,
                        };
                    }
                    Ok(CycleEnd::Shutdown) => return Flow::Shutdown,
                    Err(_) => {
                        error!("Poll cycle panicked, backing off");
                        self.state = MonitorState::BackoffWait {
                            delay: DEFAULT_BACKOFF,
                            resume: Resume::Polling,
                        };
                    }
                }
            }
            MonitorState::Sleeping => {
                if wait(self.config.poll_interval(), shutdown).await {
                    return Flow::Shutdown;
                }
                self.state = MonitorState::Polling;
            }
            MonitorState::BackoffWait { delay, resume } => {
                if wait(delay, shutdown).await {
                    return Flow::Shutdown;
                }
                self.state = resume.into();
            }
        }

        Flow::Continue
    }

    async fn authenticate(&mut self) {
        match self.session.ensure_credential(self.fetcher.client()).await {
            Ok(_) => {
                info!("Marketplace session ready");
                self.state = MonitorState::Polling;
            }
            Err(e) => {
                let delay = self.config.auth_backoff();
                warn!(
                    "Authentication failed, retrying in {:?}: {}",
                    delay,
                    e.user_friendly_message()
                );
                self.state = MonitorState::BackoffWait {
                    delay,
                    resume: Resume::Authenticating,
                };
            }
        }
    }

    async fn poll_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> CycleEnd {
        let credential = match self.session.ensure_credential(self.fetcher.client()).await {
            Ok(credential) => credential,
            Err(e) => {
                self.reporter.report_warning("No usable marketplace session", &e);
                return CycleEnd::Reauthenticate;
            }
        };

        let terms: Vec<String> = self
            .config
            .active_search_terms()
            .map(str::to_string)
            .collect();
        let mut report = CycleReport {
            terms: terms.len(),
            ..CycleReport::default()
        };

        let end = self
            .poll_terms(&terms, &credential, shutdown, &mut report)
            .await;

        info!(
            candidates = report.candidates,
            skipped_seen = report.skipped_seen,
            fetch_failures = report.fetch_failures,
            invalid = report.invalid,
            filtered = report.filtered,
            recorded = report.recorded,
            notified = report.notified,
            failures = report.failures,
            "Poll cycle finished"
        );
        self.last_report = Some(report);
        end
    }

    async fn poll_terms(
        &mut self,
        terms: &[String],
        credential: &Credential,
        shutdown: &watch::Receiver<bool>,
        report: &mut CycleReport,
    ) -> CycleEnd {
        for term in terms {
            let candidates = match self.fetcher.search(term, credential).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    if self.handle_failure(&e, report) {
                        return CycleEnd::Reauthenticate;
                    }
                    continue;
                }
            };

            for candidate in &candidates {
                if *shutdown.borrow() {
                    return CycleEnd::Shutdown;
                }
                report.candidates += 1;

                let result = AssertUnwindSafe(self.process_candidate(candidate, credential))
                    .catch_unwind()
                    .await;

                match result {
                    Ok(Ok(outcome)) => tally(report, outcome),
                    Ok(Err(e)) => {
                        if self.handle_failure(&e, report) {
                            return CycleEnd::Reauthenticate;
                        }
                    }
                    Err(_) => {
                        error!(term = %term, "Processing a candidate panicked, skipping it");
                        report.failures += 1;
                    }
                }
            }
        }

        CycleEnd::Completed
    }

    /// Returns `true` when the credential was dropped and the cycle must stop.
    ///
    /// `ListingFetcher` degrades every other marketplace failure, so in
    /// practice only rejected credentials arrive here. Anything else costs
    /// the current term or candidate; the cycle itself is never paused.
    fn handle_failure(&mut self, e: &CoreError, report: &mut CycleReport) -> bool {
        match ErrorRecovery::determine_strategy(e) {
            RecoveryStrategy::Reauthenticate => {
                warn!("Marketplace rejected the credential, re-authenticating");
                self.session.invalidate();
                true
            }
            RecoveryStrategy::Backoff { .. } | RecoveryStrategy::Skip => {
                self.reporter.report_error("Candidate skipped", e);
                report.failures += 1;
                false
            }
        }
    }

    async fn process_candidate(
        &mut self,
        candidate: &Value,
        credential: &Credential,
    ) -> Result<CandidateOutcome, CoreError> {
        let Some(id) = candidate_id(candidate) else {
            debug!("Search result without an id");
            return Ok(CandidateOutcome::Invalid);
        };
        if self.store.is_seen(&id) {
            return Ok(CandidateOutcome::SkippedSeen);
        }

        let Some(details) = self.fetcher.fetch_details(&id, credential).await? else {
            return Ok(CandidateOutcome::FetchFailed);
        };

        let listing = match normalize(&details) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(id = %id, "Skipping malformed product: {}", e);
                return Ok(CandidateOutcome::Invalid);
            }
        };

        if !passes_country_filter(&listing, &self.config.country_filter) {
            debug!(id = %id, country = %listing.country, "Filtered by country");
            return Ok(CandidateOutcome::Filtered);
        }

        if let Err(e) = self.store.record(&listing).await {
            error!(id = %id, "Failed to record product, not notifying: {}", e);
            return Ok(CandidateOutcome::RecordFailed);
        }

        match self.notifier.notify(&listing).await {
            Ok(()) => {
                info!("Posted: {}", listing.title);
                Ok(CandidateOutcome::Notified)
            }
            Err(e) => {
                warn!(id = %id, "Notification not delivered: {}", e.user_friendly_message());
                Ok(CandidateOutcome::NotifyFailed)
            }
        }
    }
}

fn tally(report: &mut CycleReport, outcome: CandidateOutcome) {
    match outcome {
        CandidateOutcome::SkippedSeen => report.skipped_seen += 1,
        CandidateOutcome::FetchFailed => report.fetch_failures += 1,
        CandidateOutcome::Invalid => report.invalid += 1,
        CandidateOutcome::Filtered => report.filtered += 1,
        CandidateOutcome::RecordFailed => report.failures += 1,
        CandidateOutcome::Notified => {
            report.recorded += 1;
            report.notified += 1;
        }
        CandidateOutcome::NotifyFailed => {
            report.recorded += 1;
            report.failures += 1;
        }
    }
}

/// Sleep for `delay`; returns `true` if shutdown was requested meanwhile.
async fn wait(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
