//! Background reclamation of delivered and expired message references
//!
//! A supervisor task ticks every `cleanup_interval` and makes sure exactly
//! one cleanup run is active. The run walks all endpoints, trimming each log
//! head while the head ref is checkpointed or expired, until the store is
//! closed.

use crate::message_store::StoreState;
use ferry_core::{observe, MessageStoreConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Shortest supervisor period; `tokio::time::interval` rejects zero
const MIN_TICK: Duration = Duration::from_secs(1);

/// Totals of one cleanup pass over all endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Endpoints visited
    pub endpoints: usize,

    /// References trimmed from endpoint logs
    pub refs_removed: u64,

    /// Message bodies deleted because their refcount reached zero
    pub bodies_deleted: u64,

    /// Endpoints whose cleanup failed
    pub failures: usize,
}

/// Outcome of trimming one endpoint log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EndpointCleanup {
    pub refs_removed: u64,
    pub bodies_deleted: u64,
}

impl CleanupStats {
    pub(crate) fn record(&mut self, outcome: EndpointCleanup) {
        self.endpoints += 1;
        self.refs_removed += outcome.refs_removed;
        self.bodies_deleted += outcome.bodies_deleted;
    }

    pub(crate) fn record_failure(&mut self) {
        self.endpoints += 1;
        self.failures += 1;
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CleanupSettings {
    pub interval: Duration,
    pub endpoint_pause: Duration,
    pub min_pass_interval: Duration,
    pub shutdown_grace: Duration,
}

impl CleanupSettings {
    pub(crate) fn from_config(config: &MessageStoreConfig) -> Self {
        Self {
            interval: config.cleanup_interval().max(MIN_TICK),
            endpoint_pause: config.endpoint_pause(),
            min_pass_interval: config.min_pass_interval(),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    /// Sleep between two passes: `min(ttl / 2, interval)`, floored
    pub(crate) fn pass_pause(&self, time_to_live: Duration) -> Duration {
        (time_to_live / 2)
            .min(self.interval)
            .max(self.min_pass_interval)
    }
}

/// Handle on the background cleanup tasks of one message store
pub(crate) struct CleanupProcessor {
    cancel: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

impl CleanupProcessor {
    pub(crate) fn start(state: Arc<StoreState>, settings: CleanupSettings, runtime: &Handle) -> Self {
        let cancel = CancellationToken::new();
        let supervisor = runtime.spawn(supervise(state, settings, cancel.clone()));

        Self {
            cancel,
            supervisor: Mutex::new(Some(supervisor)),
            shutdown_grace: settings.shutdown_grace,
        }
    }

    /// Cancel and wait up to the shutdown grace for the active run to
    /// return. A run still busy after that is left to finish on its own.
    pub(crate) async fn stop(&self) {
        self.cancel.cancel();

        let supervisor = self.supervisor.lock().take();
        let Some(supervisor) = supervisor else {
            return;
        };

        match tokio::time::timeout(self.shutdown_grace, supervisor).await {
            Ok(Ok(())) => tracing::debug!("Cleanup processor stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Cleanup supervisor failed"),
            Err(_) => tracing::warn!(
                grace = ?self.shutdown_grace,
                "Cleanup run did not stop within the grace period; abandoning it"
            ),
        }
    }
}

impl Drop for CleanupProcessor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn supervise(state: Arc<StoreState>, settings: CleanupSettings, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut run: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Some(active) = run.take() {
            if !active.is_finished() {
                tracing::trace!("Cleanup run still active; ignoring tick");
                run = Some(active);
                continue;
            }
            // a run only returns on its own if it failed
            match active.await {
                Ok(()) => tracing::warn!("Cleanup run exited early; restarting"),
                Err(e) => tracing::error!(error = %e, "Cleanup run failed; restarting"),
            }
        }

        run = Some(tokio::spawn(run_cleanup(
            state.clone(),
            settings,
            cancel.clone(),
        )));
    }

    if let Some(active) = run {
        if let Err(e) = active.await {
            tracing::error!(error = %e, "Cleanup run failed during shutdown");
        }
    }
}

async fn run_cleanup(state: Arc<StoreState>, settings: CleanupSettings, cancel: CancellationToken) {
    tracing::info!("Cleanup run started");

    while !cancel.is_cancelled() {
        let started = Instant::now();
        let mut stats = CleanupStats::default();

        for (i, (endpoint_id, log)) in state.endpoint_snapshot().into_iter().enumerate() {
            if i > 0 && sleep_or_cancel(&cancel, settings.endpoint_pause).await {
                break;
            }
            if cancel.is_cancelled() {
                break;
            }

            let task_state = state.clone();
            let task_cancel = cancel.clone();
            let task_id = endpoint_id.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                task_state.cleanup_endpoint(&task_id, &log, Some(&task_cancel))
            })
            .await;

            match outcome {
                Ok(Ok(outcome)) => stats.record(outcome),
                Ok(Err(e)) => {
                    stats.record_failure();
                    tracing::error!(endpoint = %endpoint_id, error = %e, "Endpoint cleanup failed");
                }
                Err(e) => {
                    stats.record_failure();
                    tracing::error!(endpoint = %endpoint_id, error = %e, "Endpoint cleanup task panicked");
                }
            }
        }

        observe::record_cleanup_pass(started.elapsed());
        tracing::debug!(
            endpoints = stats.endpoints,
            refs_removed = stats.refs_removed,
            bodies_deleted = stats.bodies_deleted,
            failures = stats.failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cleanup pass complete"
        );

        let pause = settings.pass_pause(state.time_to_live());
        if sleep_or_cancel(&cancel, pause).await {
            break;
        }
    }

    tracing::info!("Cleanup run stopped");
}

/// Sleep for `duration`; returns true if cancelled first
async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
