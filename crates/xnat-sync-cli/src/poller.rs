//! Import completion poller
//!
//! After a bulk import is submitted the archive digests it in the
//! pre-archive with no notification when it is done. Two tasks share one
//! [`ImportWaitState`]:
//!
//! - the worker polls the pre-archive with a jittered, growing delay and
//!   releases the state once no matching entry is still `RECEIVING`;
//! - the timeout tracker releases it when the ceiling is reached, reporting
//!   the time remaining at a fixed cadence until then.
//!
//! Whichever releases first decides the [`ImportOutcome`]; the other task
//! observes the release and exits without touching the archive again.

use crate::api::{PreArchiveRecord, XnatClient};
use crate::config::{PollSettings, MAX_POLL_TIMEOUT_SECS};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How an import wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// No matching pre-archive entry remains
    Completed,
    /// Entries remain but none is still receiving
    Stalled,
    /// The ceiling elapsed first
    TimedOut,
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportOutcome::Completed => write!(f, "completed"),
            ImportOutcome::Stalled => write!(f, "stalled"),
            ImportOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// The session whose import is awaited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub project: String,
    pub subject: String,
    pub session: String,
}

/// Where the worker reads in-flight imports from
#[async_trait]
pub trait PreArchiveSource: Send + Sync {
    /// Pre-archive entries belonging to `target`.
    async fn pending(&self, target: &ImportTarget) -> Result<Vec<PreArchiveRecord>>;
}

#[async_trait]
impl PreArchiveSource for XnatClient {
    async fn pending(&self, target: &ImportTarget) -> Result<Vec<PreArchiveRecord>> {
        let records = self.prearchive(&target.project).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.subject == target.subject && r.session == target.session)
            .collect())
    }
}

/// One-way latch shared by the worker and the timeout tracker.
///
/// Starts acquired. The first `release` records the outcome and wakes both
/// tasks; later releases change nothing.
#[derive(Debug)]
pub struct ImportWaitState {
    released: CancellationToken,
    outcome: OnceLock<ImportOutcome>,
    started: Instant,
    timeout: Duration,
    cadence: Duration,
}

impl ImportWaitState {
    /// Both durations are capped at [`MAX_POLL_TIMEOUT_SECS`] so the
    /// deadline always fits in an [`Instant`].
    pub fn new(timeout: Duration, cadence: Duration) -> Self {
        let ceiling = Duration::from_secs(MAX_POLL_TIMEOUT_SECS);
        Self {
            released: CancellationToken::new(),
            outcome: OnceLock::new(),
            started: Instant::now(),
            timeout: timeout.min(ceiling),
            cadence: cadence.min(ceiling),
        }
    }

    /// Release with `outcome`. Returns whether this call won.
    pub fn release(&self, outcome: ImportOutcome) -> bool {
        let won = self.outcome.set(outcome).is_ok();
        self.released.cancel();
        won
    }

    /// Release without an outcome (the worker failed).
    pub fn abort(&self) {
        self.released.cancel();
    }

    pub fn is_acquired(&self) -> bool {
        !self.released.is_cancelled()
    }

    pub fn outcome(&self) -> Option<ImportOutcome> {
        self.outcome.get().copied()
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.timeout
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    async fn wait_released(&self) {
        self.released.cancelled().await
    }
}

/// Poll delay schedule: `next = min(max, prev^exponent + jitter * noise)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub exponent: f64,
    pub max_jitter: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_settings(settings: &PollSettings) -> Self {
        Self {
            base: settings.base_delay,
            exponent: settings.growth_exponent,
            max_jitter: settings.max_jitter,
            max: settings.max_delay,
        }
    }

    /// Delay following `prev` (the base delay when there is none).
    /// `noise` is clamped to `[0, 1]`.
    pub fn next_delay(&self, prev: Option<Duration>, noise: f64) -> Duration {
        let secs = match prev {
            None => self.base.as_secs_f64(),
            Some(prev) => {
                prev.as_secs_f64().powf(self.exponent)
                    + self.max_jitter.as_secs_f64() * noise.clamp(0.0, 1.0)
            }
        };
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }
}

/// Waits for bulk imports to leave the pre-archive
#[derive(Debug, Clone)]
pub struct ImportPoller {
    settings: PollSettings,
}

impl ImportPoller {
    pub fn new(settings: PollSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Block until the import of `target` resolves or the ceiling elapses.
    ///
    /// A failed pre-archive query ends the wait with that failure.
    pub async fn wait(
        &self,
        source: Arc<dyn PreArchiveSource>,
        target: ImportTarget,
    ) -> Result<ImportOutcome> {
        let state = Arc::new(ImportWaitState::new(
            self.settings.timeout,
            self.settings.report_interval,
        ));
        info!(
            session = %target.session,
            timeout_secs = self.settings.timeout.as_secs(),
            "Waiting for import to finish"
        );

        let worker = tokio::spawn(poll_worker(
            source,
            target,
            state.clone(),
            Backoff::from_settings(&self.settings),
        ));
        let tracker = tokio::spawn(track_timeout(state.clone()));

        let (worker, tracker) = tokio::join!(worker, tracker);
        let reports = tracker.map_err(|e| SyncError::Other(e.into()))?;
        worker.map_err(|e| SyncError::Other(e.into()))??;
        debug!(reports, "Import wait finished");

        state
            .outcome()
            .ok_or_else(|| SyncError::Other(anyhow::anyhow!("import wait ended without an outcome")))
    }
}

async fn poll_worker(
    source: Arc<dyn PreArchiveSource>,
    target: ImportTarget,
    state: Arc<ImportWaitState>,
    backoff: Backoff,
) -> Result<()> {
    let mut delay = None;

    while state.is_acquired() {
        let records = tokio::select! {
            _ = state.wait_released() => return Ok(()),
            records = source.pending(&target) => records,
        };

        let records = match records {
            Ok(records) => records,
            Err(err) => {
                state.abort();
                return Err(err);
            }
        };

        if records.is_empty() {
            if state.release(ImportOutcome::Completed) {
                debug!(session = %target.session, "Import left the pre-archive");
            }
            return Ok(());
        }

        if !records.iter().any(PreArchiveRecord::is_receiving) {
            if state.release(ImportOutcome::Stalled) {
                let statuses: Vec<&str> = records.iter().map(|r| r.status.as_str()).collect();
                debug!(session = %target.session, ?statuses, "Import stopped receiving");
            }
            return Ok(());
        }

        let next = backoff.next_delay(delay, noise());
        debug!(
            pending = records.len(),
            delay_secs = next.as_secs_f64(),
            "Import still receiving"
        );
        delay = Some(next);

        tokio::select! {
            _ = state.wait_released() => return Ok(()),
            _ = tokio::time::sleep(next) => {}
        }
    }

    Ok(())
}

fn noise() -> f64 {
    rand::rng().random()
}

/// Returns how many progress reports were logged.
async fn track_timeout(state: Arc<ImportWaitState>) -> usize {
    let deadline = state.deadline();
    let mut report = tokio::time::interval_at(Instant::now() + state.cadence, state.cadence);
    let mut reports = 0;

    loop {
        // A report due at the deadline is not logged
        tokio::select! {
            biased;
            _ = state.wait_released() => return reports,
            _ = tokio::time::sleep_until(deadline) => {
                if state.release(ImportOutcome::TimedOut) {
                    warn!(timeout_secs = state.timeout.as_secs(), "Gave up waiting for import");
                }
                return reports;
            }
            _ = report.tick() => {
                reports += 1;
                info!(remaining_secs = state.remaining().as_secs(), "Import in progress");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::far_future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(status: &str) -> PreArchiveRecord {
        PreArchiveRecord {
            status: status.to_string(),
            subject: "S1".to_string(),
            session: "E1".to_string(),
            uploaded: far_future(),
            scan_time: far_future(),
            scan_date: far_future(),
            last_modified: far_future(),
        }
    }

    fn target() -> ImportTarget {
        ImportTarget {
            project: "P".to_string(),
            subject: "S1".to_string(),
            session: "E1".to_string(),
        }
    }

    /// Answers every poll with a fixed listing
    struct Scripted {
        status: Option<&'static str>,
        fail: bool,
        polls: AtomicUsize,
    }

    impl Scripted {
        fn new(status: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                status,
                fail: false,
                polls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PreArchiveSource for Scripted {
        async fn pending(&self, _target: &ImportTarget) -> Result<Vec<PreArchiveRecord>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SyncError::Transport {
                    method: "GET".to_string(),
                    path: "/data/prearchive/projects/P".to_string(),
                    message: "connection reset".to_string(),
                });
            }
            Ok(self.status.map(record).into_iter().collect())
        }
    }

    fn settings() -> PollSettings {
        PollSettings::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_listing_completes_on_first_poll() {
        let source = Scripted::new(None);
        let poller = ImportPoller::new(settings()).unwrap();

        let started = Instant::now();
        let outcome = poller.wait(source.clone(), target()).await.unwrap();

        assert_eq!(outcome, ImportOutcome::Completed);
        assert_eq!(source.polls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < settings().report_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receiving_forever_times_out_at_ceiling() {
        let source = Scripted::new(Some("RECEIVING"));
        let poller = ImportPoller::new(settings()).unwrap();

        let started = Instant::now();
        let outcome = poller.wait(source.clone(), target()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome, ImportOutcome::TimedOut);
        assert!(elapsed >= settings().timeout);
        assert!(elapsed <= settings().timeout + settings().report_interval);

        let polls = source.polls.load(Ordering::SeqCst);
        assert!(polls > 1);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_receiving_entries_are_stalled() {
        let source = Scripted::new(Some("CONFLICT"));
        let poller = ImportPoller::new(settings()).unwrap();

        let outcome = poller.wait(source.clone(), target()).await.unwrap();
        assert_eq!(outcome, ImportOutcome::Stalled);
        assert_eq!(source.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_ends_wait() {
        let source = Arc::new(Scripted {
            status: None,
            fail: true,
            polls: AtomicUsize::new(0),
        });
        let poller = ImportPoller::new(settings()).unwrap();

        let started = Instant::now();
        let err = poller.wait(source, target()).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(started.elapsed() < settings().timeout);
    }

    #[test]
    fn test_first_release_wins() {
        let state = ImportWaitState::new(Duration::from_secs(10), Duration::from_secs(1));
        assert!(state.is_acquired());
        assert!(state.release(ImportOutcome::Completed));
        assert!(!state.release(ImportOutcome::TimedOut));
        assert!(!state.is_acquired());
        assert_eq!(state.outcome(), Some(ImportOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_reports_on_cadence_until_deadline() {
        let state = Arc::new(ImportWaitState::new(Duration::from_secs(60), Duration::from_secs(15)));

        let reports = track_timeout(state.clone()).await;

        // 15s, 30s and 45s; the deadline wins at 60s
        assert_eq!(reports, 3);
        assert_eq!(state.outcome(), Some(ImportOutcome::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_stops_reporting_once_released() {
        let state = Arc::new(ImportWaitState::new(Duration::from_secs(60), Duration::from_secs(15)));
        let tracker = tokio::spawn(track_timeout(state.clone()));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(state.release(ImportOutcome::Completed));

        assert_eq!(tracker.await.unwrap(), 1);
        assert_eq!(state.outcome(), Some(ImportOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_timeout_is_capped() {
        let state = ImportWaitState::new(Duration::from_secs(u64::MAX), Duration::from_secs(u64::MAX));
        let ceiling = Duration::from_secs(MAX_POLL_TIMEOUT_SECS);
        assert_eq!(state.deadline() - Instant::now(), ceiling);
        assert_eq!(state.remaining(), ceiling);
    }

    #[test]
    fn test_abort_leaves_no_outcome() {
        let state = ImportWaitState::new(Duration::from_secs(10), Duration::from_secs(1));
        state.abort();
        assert!(!state.is_acquired());
        assert_eq!(state.outcome(), None);
    }

    #[test]
    fn test_backoff_grows_monotonically_and_caps() {
        let backoff = Backoff::from_settings(&settings());

        let mut prev = None;
        let mut delays = Vec::new();
        for _ in 0..40 {
            let next = backoff.next_delay(prev, 0.0);
            delays.push(next);
            prev = Some(next);
        }

        assert_eq!(delays[0], backoff.base);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= backoff.max));
        assert_eq!(*delays.last().unwrap(), backoff.max);
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let backoff = Backoff::from_settings(&settings());
        let prev = Some(Duration::from_secs(4));

        let quiet = backoff.next_delay(prev, 0.0);
        let loud = backoff.next_delay(prev, 5.0);
        assert!(loud > quiet);
        assert!(loud - quiet <= backoff.max_jitter + Duration::from_millis(1));
        assert!(backoff.next_delay(Some(Duration::from_secs(29)), 1.0) <= backoff.max);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ImportOutcome::TimedOut.to_string(), "timed out");
    }
}
