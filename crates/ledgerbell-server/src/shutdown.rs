//! Process shutdown: one token for the listener, the bridge and every
//! session, plus a drain of the long-running server tasks.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long `serve` waits for tracked tasks after cancelling.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Which tracked tasks stopped in time.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Finished before the deadline.
    pub finished: Vec<&'static str>,
    /// Still running at the deadline; aborted.
    pub abandoned: Vec<&'static str>,
}

/// Shared shutdown signal and the named tasks to drain once it fires.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// A coordinator with nothing tracked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that fires on shutdown. Sessions take child tokens of it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the token has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drain `handle` under `name` on shutdown.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name, handle));
    }

    /// Wait for Ctrl-C, or for shutdown to be fired elsewhere, then fire it.
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            r = tokio::signal::ctrl_c() => match r {
                Ok(()) => info!("ctrl-c received, shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
            },
            () = self.token.cancelled() => {}
        }
        self.shutdown();
    }

    /// Fire the token and give every tracked task until `timeout` to stop.
    /// Tasks still running at the deadline are aborted.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        self.shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let deadline = Instant::now() + timeout;
        let mut report = DrainReport::default();

        for (name, mut handle) in tasks {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_ok() {
                report.finished.push(name);
            } else {
                handle.abort();
                report.abandoned.push(name);
            }
        }

        if report.abandoned.is_empty() {
            info!(finished = ?report.finished, "shutdown drained");
        } else {
            warn!(abandoned = ?report.abandoned, "shutdown timed out after {timeout:?}");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_coordinator_is_running() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[test]
    fn shutdown_reaches_every_token() {
        let coord = ShutdownCoordinator::new();
        let session = coord.token().child_token();
        coord.shutdown();
        coord.shutdown();
        assert!(session.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_waits_for_tasks_that_honour_the_token() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("bridge", tokio::spawn(async move { token.cancelled().await }));

        let report = coord.drain(DEFAULT_DRAIN_TIMEOUT).await;
        assert_eq!(report.finished, vec!["bridge"]);
        assert!(report.abandoned.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_stragglers_at_the_deadline() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("http", tokio::spawn(async move { token.cancelled().await }));
        coord.track(
            "stuck",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(300)).await;
            }),
        );

        let report = coord.drain(Duration::from_millis(100)).await;
        assert_eq!(report.finished, vec!["http"]);
        assert_eq!(report.abandoned, vec!["stuck"]);
    }

    #[tokio::test]
    async fn signal_wait_returns_on_external_shutdown() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.wait_for_signal().await;
        assert!(coord.is_shutting_down());
    }
}
