use crate::{
    alert::AlertSink,
    cache::TtlCache,
    config::Settings,
    crypto::CredentialStore,
    dates::DateSelection,
    error::{SignerError, SignerResult},
    metrics,
    portal::Portal,
    signing::{check_cancelled, dispatch, sleep_cancellable, BatchResult, SigningContext},
};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod tasks;

/// Whether the portal session is believed to be authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

/// What one polling cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Documents returned by the search
    pub found: usize,
    /// Documents left for manual signing
    pub manual: usize,
    /// Outcome of the signing batch, if one ran
    pub batch: Option<BatchResult>,
}

/// Polling loop that finds unsigned documents and signs them
pub struct SigningJob {
    settings: Settings,
    portal: Arc<dyn Portal>,
    store: Arc<dyn CredentialStore>,
    alert: Arc<dyn AlertSink>,
    dates: DateSelection,
    cancel: CancellationToken,
    cache: TtlCache,
    last_sweep: NaiveDate,
}

impl SigningJob {
    pub fn new(
        settings: Settings,
        portal: Arc<dyn Portal>,
        store: Arc<dyn CredentialStore>,
        alert: Arc<dyn AlertSink>,
        dates: DateSelection,
        cancel: CancellationToken,
    ) -> Self {
        let cache = TtlCache::new(settings.cache_minutes);
        Self {
            settings,
            portal,
            store,
            alert,
            dates,
            cancel,
            cache,
            last_sweep: Local::now().date_naive(),
        }
    }

    /// Run cycles until cancelled or a fatal condition occurs
    pub async fn run(mut self) -> SignerResult<()> {
        info!(
            "Starting signing loop: {} worker(s), pause {} min",
            self.settings.thread_count, self.settings.pause_minutes
        );

        let mut session = SessionState::LoggedOut;

        loop {
            let span = info_span!("cycle", id = %Uuid::new_v4());
            let (next, result) = self.run_cycle(session).instrument(span).await;
            session = next;

            match result {
                Ok(report) => {
                    metrics::record_cycle("ok");
                    debug!(
                        "Cycle finished: {} found, {} manual, batch {:?}",
                        report.found, report.manual, report.batch
                    );
                }
                Err(SignerError::StopRequested) => {
                    metrics::record_cycle("stopped");
                    info!("Stop requested, leaving the signing loop");
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    metrics::record_cycle("fatal");
                    error!("FATAL: {}", e);
                    return Err(e);
                }
                Err(e @ SignerError::SessionExpired(_)) => {
                    metrics::record_cycle("session_expired");
                    warn!("{}, will log in again", e);
                }
                Err(e) => {
                    metrics::record_cycle("error");
                    error!("Cycle failed: {}", e);
                }
            }

            if self.pause().await.is_err() {
                info!("Stop requested, leaving the signing loop");
                return Ok(());
            }
        }
    }

    /// Run one polling cycle starting from `session`, returning the
    /// session state the next cycle should start from
    pub async fn run_cycle(
        &mut self,
        session: SessionState,
    ) -> (SessionState, SignerResult<CycleReport>) {
        let mut session = session;
        let result = self.cycle(&mut session).await;
        if matches!(result, Err(SignerError::SessionExpired(_))) {
            session = SessionState::LoggedOut;
        }
        (session, result)
    }

    async fn cycle(&mut self, session: &mut SessionState) -> SignerResult<CycleReport> {
        check_cancelled(&self.cancel)?;

        if *session == SessionState::LoggedOut {
            tasks::login(self.portal.as_ref(), &self.settings, &self.cancel).await?;
            *session = SessionState::LoggedIn;
        }

        self.sweep_cache();

        let range = self.dates.current();
        info!("Searching documents for {}", range.period());
        let documents = tasks::search_documents(self.portal.as_ref(), &range, &self.cancel).await?;

        let mut report = CycleReport {
            found: documents.len(),
            ..Default::default()
        };

        tasks::log_documents_with_errors(&documents);
        let candidates = tasks::select_candidates(documents, &self.settings, &mut self.cache);

        report.manual = candidates.manual.len();
        metrics::set_manual_documents(report.manual);
        if candidates.manual.is_empty() {
            self.alert.clear();
        } else {
            self.alert.raise(candidates.manual.len());
        }

        if candidates.to_sign.is_empty() {
            info!("Nothing to sign");
            return Ok(report);
        }
        info!("{} document(s) to sign", candidates.to_sign.len());

        let bindings =
            tasks::fetch_certificates(self.portal.as_ref(), &self.store, &self.cancel).await?;

        let ctx = SigningContext {
            portal: Arc::clone(&self.portal),
            store: Arc::clone(&self.store),
            cancel: self.cancel.clone(),
            safety_margin: self.settings.cert_safety_margin(),
            pacing: self.settings.signing_interval(),
        };

        let started = Instant::now();
        let batch = dispatch(
            &ctx,
            candidates.to_sign,
            Arc::new(bindings),
            self.settings.thread_count,
        )
        .await?;
        let elapsed = started.elapsed();

        self.cache.insert_range(batch.total.failed.iter().cloned());
        metrics::set_cache_size(self.cache.len());
        metrics::record_batch(
            batch.total.signed,
            batch.total.failed.len(),
            elapsed.as_secs_f64(),
        );

        info!(
            "Signed {}{}, failed {}, took {:.1}s, {} in failure cache",
            batch.total.signed,
            batch.summary(),
            batch.total.failed.len(),
            elapsed.as_secs_f64(),
            self.cache.len()
        );
        debug!("Totals: {}", metrics::summary());

        report.batch = Some(batch);
        Ok(report)
    }

    /// Drop expired failures once per calendar day
    fn sweep_cache(&mut self) {
        let today = Local::now().date_naive();
        if today == self.last_sweep {
            return;
        }
        self.last_sweep = today;

        let removed = self.cache.remove_expired();
        metrics::set_cache_size(self.cache.len());
        if removed > 0 {
            info!("Removed {} expired entries from the failure cache", removed);
        }
    }

    /// Wait out the polling interval one second at a time
    async fn pause(&self) -> SignerResult<()> {
        debug!("Sleeping {} min", self.settings.pause_minutes);
        for _ in 0..self.settings.pause().as_secs() {
            sleep_cancellable(&self.cancel, Duration::from_secs(1)).await?;
        }
        Ok(())
    }
}
