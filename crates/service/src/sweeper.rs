use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use signoff_core::config::ApprovalsConfig;
use signoff_core::domain::approval::ApprovalRecord;
use signoff_core::errors::ErrorKind;

use crate::service::ApprovalService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweeperSettings {
    pub interval: Duration,
    pub timeout_millis: i64,
    pub retry: RetryPolicy,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            timeout_millis: 30 * 60_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl SweeperSettings {
    pub fn from_config(config: &ApprovalsConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            timeout_millis: config.timeout_millis(),
            retry: RetryPolicy {
                max_retries: config.cancel_max_retries,
                base_delay_ms: config.retry_base_delay_ms,
                ..RetryPolicy::default()
            },
        }
    }
}

/// Counts from one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub eligible: usize,
    pub canceled: usize,
    /// Finalized by someone else between the scan and the cancellation.
    pub superseded: usize,
    pub failed: usize,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodically cancels pending requests older than the timeout window.
pub struct TimeoutSweeper {
    service: Arc<ApprovalService>,
    settings: SweeperSettings,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl TimeoutSweeper {
    pub fn new(service: Arc<ApprovalService>, settings: SweeperSettings) -> Self {
        Self {
            service,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SweeperSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        match self.worker.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Spawns the periodic loop. Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let mut slot = self.worker_slot();
        if slot.as_ref().is_some_and(|worker| !worker.handle.is_finished()) {
            return false;
        }

        let (shutdown, receiver) = watch::channel(false);
        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.service),
            self.settings.clone(),
            Arc::clone(&self.running),
            receiver,
        ));
        *slot = Some(Worker { shutdown, handle });

        info!(
            event_name = "sweeper.started",
            interval_secs = self.settings.interval.as_secs(),
            timeout_millis = self.settings.timeout_millis,
            "timeout sweeper started"
        );
        true
    }

    /// Signals the loop to stop and waits for it to exit. A pass already in flight runs to
    /// completion first.
    pub async fn stop(&self) {
        let worker = self.worker_slot().take();
        let Some(worker) = worker else {
            return;
        };

        let _ = worker.shutdown.send(true);
        if let Err(join_error) = worker.handle.await {
            error!(
                event_name = "sweeper.stop.join_failed",
                error = %join_error,
                "timeout sweeper loop ended abnormally"
            );
        }
        self.running.store(false, Ordering::SeqCst);
        info!(event_name = "sweeper.stopped", "timeout sweeper stopped");
    }

    /// Runs a single pass immediately, outside the periodic schedule.
    pub async fn sweep_once(&self) -> SweepReport {
        sweep_pass(&self.service, &self.settings).await
    }
}

async fn run_loop(
    service: Arc<ApprovalService>,
    settings: SweeperSettings,
    running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = settings.interval.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }

                let pass_service = Arc::clone(&service);
                let pass_settings = settings.clone();
                let pass = tokio::spawn(async move {
                    sweep_pass(&pass_service, &pass_settings).await
                });

                match pass.await {
                    Ok(_) => {}
                    Err(join_error) if join_error.is_panic() => error!(
                        event_name = "sweeper.pass.panicked",
                        error = %join_error,
                        "sweep pass panicked; continuing on next tick"
                    ),
                    Err(join_error) => warn!(
                        event_name = "sweeper.pass.aborted",
                        error = %join_error,
                        "sweep pass was aborted"
                    ),
                }
            }
        }
    }

    running.store(false, Ordering::SeqCst);
}

fn is_expired(record: &ApprovalRecord, now: i64, timeout_millis: i64) -> bool {
    record.is_pending() && now.saturating_sub(record.created_at) >= timeout_millis
}

async fn sweep_pass(service: &ApprovalService, settings: &SweeperSettings) -> SweepReport {
    let mut report = SweepReport::default();
    let now = service.now_millis();

    let listing = match service.repository().list_approver_indexed().await {
        Ok(listing) => listing,
        Err(error) => {
            error!(
                event_name = "sweeper.pass.scan_failed",
                error = %error,
                "could not scan the approver index"
            );
            return report;
        }
    };

    report.scanned = listing.records.len();
    let expired = listing
        .records
        .iter()
        .filter(|record| is_expired(record, now, settings.timeout_millis));

    for record in expired {
        report.eligible += 1;
        cancel_with_retry(service, &settings.retry, record, &mut report).await;
    }

    if report.eligible == 0 {
        debug!(
            event_name = "sweeper.pass.completed",
            scanned = report.scanned,
            skipped = listing.skipped.len(),
            "sweep pass found nothing to cancel"
        );
    } else {
        info!(
            event_name = "sweeper.pass.completed",
            scanned = report.scanned,
            skipped = listing.skipped.len(),
            eligible = report.eligible,
            canceled = report.canceled,
            superseded = report.superseded,
            failed = report.failed,
            "sweep pass completed"
        );
    }

    report
}

async fn cancel_with_retry(
    service: &ApprovalService,
    policy: &RetryPolicy,
    record: &ApprovalRecord,
    report: &mut SweepReport,
) {
    let mut attempt = 0;
    loop {
        match service.cancel_expired(record).await {
            Ok(_) => {
                report.canceled += 1;
                debug!(
                    event_name = "sweeper.record.canceled",
                    approval_id = %record.id,
                    code = %record.code,
                    "timed-out approval canceled"
                );
                return;
            }
            Err(error) if error.kind() == ErrorKind::Immutable => {
                report.superseded += 1;
                debug!(
                    event_name = "sweeper.record.superseded",
                    approval_id = %record.id,
                    code = %record.code,
                    error = %error,
                    "approval was finalized before the sweeper reached it"
                );
                return;
            }
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                debug!(
                    event_name = "sweeper.record.retrying",
                    approval_id = %record.id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "retrying timed-out approval cancellation"
                );
                attempt += 1;
                if !delay.is_zero() {
                    time::sleep(delay).await;
                }
            }
            Err(error) => {
                report.failed += 1;
                error!(
                    event_name = "sweeper.record.cancel_failed",
                    approval_id = %record.id,
                    code = %record.code,
                    attempts = attempt + 1,
                    error = %error,
                    "could not cancel timed-out approval"
                );
                return;
            }
        }
    }
}
