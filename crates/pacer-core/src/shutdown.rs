//! Graceful shutdown
//!
//! One root [`CancellationToken`] fans out to every in-flight request and
//! workflow run. Cancelling it makes the workflow engine suspend runs at
//! their current step; the controller then waits for registered work to
//! drain before reporting termination.
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//! let engine = WorkflowEngine::new(registry, teams, store).with_shutdown(shutdown.token());
//!
//! tokio::spawn(shutdown_on_signal(shutdown.clone()));
//! let _guard = shutdown.register_task();
//! engine.start("daily-checkin", input).await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownPhase {
    /// Accepting requests and runs
    Running = 0,
    /// Token cancelled; in-flight runs are suspending
    Draining = 1,
    /// Drain timed out; remaining work is abandoned
    Terminating = 2,
    /// Nothing left running
    Terminated = 3,
}

impl ShutdownPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            2 => Self::Terminating,
            _ => Self::Terminated,
        }
    }
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Coordinates shutdown across requests and workflow runs
pub struct ShutdownController {
    root: CancellationToken,
    phase: AtomicU8,
    phase_tx: watch::Sender<ShutdownPhase>,
    initiated: AtomicBool,
    active: AtomicU32,
    drain_timeout: Duration,
}

impl ShutdownController {
    /// Controller with a 30 second drain timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Controller with a custom drain timeout
    #[must_use]
    pub fn with_timeout(drain_timeout: Duration) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(ShutdownPhase::Running);
        Arc::new(Self {
            root: CancellationToken::new(),
            phase: AtomicU8::new(ShutdownPhase::Running as u8),
            phase_tx,
            initiated: AtomicBool::new(false),
            active: AtomicU32::new(0),
            drain_timeout,
        })
    }

    /// Child of the root token
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Observe phase changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase_tx.subscribe()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Whether new requests or runs may start
    #[must_use]
    pub fn is_accepting_work(&self) -> bool {
        self.phase() == ShutdownPhase::Running
    }

    /// Track a unit of work until the guard is dropped
    #[must_use]
    pub fn register_task(&self) -> TaskGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        TaskGuard { controller: self }
    }

    /// Registered work still running
    #[must_use]
    pub fn active_task_count(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        self.phase_tx.send_replace(phase);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Cancel the root token and wait for registered work to drain
    ///
    /// Only the first call does anything; later calls return at once.
    pub async fn shutdown(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        self.set_phase(ShutdownPhase::Draining);
        self.root.cancel();

        let started = Instant::now();
        loop {
            let active = self.active_task_count();
            if active == 0 {
                info!("All work drained");
                break;
            }
            if started.elapsed() >= self.drain_timeout {
                warn!(
                    active_tasks = active,
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    "Drain timeout exceeded, abandoning remaining work"
                );
                self.set_phase(ShutdownPhase::Terminating);
                break;
            }
            debug!(active_tasks = active, "Waiting for work to drain");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.set_phase(ShutdownPhase::Terminated);
    }

    /// Cancel everything without waiting
    pub fn force_shutdown(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!("Force shutdown initiated");
            self.root.cancel();
            self.set_phase(ShutdownPhase::Terminated);
        }
    }
}

/// Registered unit of work; decrements the active count on drop
pub struct TaskGuard<'a> {
    controller: &'a ShutdownController,
}

impl TaskGuard<'_> {
    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.controller.root.is_cancelled()
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.controller.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolve on Ctrl-C or SIGTERM
///
/// A signal handler that cannot be installed is logged and never fires.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

/// Wait for a signal, then run the graceful shutdown
pub async fn shutdown_on_signal(controller: Arc<ShutdownController>) {
    wait_for_shutdown_signal().await;
    controller.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_phases() {
        let controller = ShutdownController::new();
        assert_eq!(controller.phase(), ShutdownPhase::Running);
        assert!(controller.is_accepting_work());

        controller.shutdown().await;

        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
        assert!(controller.is_shutting_down());
        assert!(!controller.is_accepting_work());
    }

    #[tokio::test]
    async fn test_child_tokens_cancelled() {
        let controller = ShutdownController::new();
        let run_token = controller.token();
        let nested = run_token.child_token();

        controller.shutdown().await;

        assert!(run_token.is_cancelled());
        assert!(nested.is_cancelled());
    }

    #[tokio::test]
    async fn test_waits_for_registered_work() {
        let controller = ShutdownController::with_timeout(Duration::from_secs(5));
        let token = controller.token();
        let worker = controller.clone();
        let handle = tokio::spawn(async move {
            let guard = worker.register_task();
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.active_task_count(), 1);

        controller.shutdown().await;

        assert_eq!(controller.active_task_count(), 0);
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
        tokio_test::assert_ok!(handle.await);
    }

    #[tokio::test]
    async fn test_drain_timeout_terminates() {
        let controller = ShutdownController::with_timeout(Duration::from_millis(30));
        let mut phases = controller.subscribe();
        let _stuck = controller.register_task();

        controller.shutdown().await;

        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
        assert_eq!(controller.active_task_count(), 1);
        assert!(phases.has_changed().unwrap_or(false));
        assert_eq!(*phases.borrow_and_update(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_second_shutdown_is_noop() {
        let controller = ShutdownController::new();
        tokio::join!(controller.shutdown(), controller.shutdown());
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[test]
    fn test_force_shutdown() {
        let controller = ShutdownController::new();
        let token = controller.token();
        controller.force_shutdown();
        assert!(token.is_cancelled());
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[test]
    fn test_guard_tracks_active_work() {
        let controller = ShutdownController::new();
        {
            let first = controller.register_task();
            let _second = controller.register_task();
            assert_eq!(controller.active_task_count(), 2);
            assert!(!first.is_cancelled());
        }
        assert_eq!(controller.active_task_count(), 0);
    }
}
