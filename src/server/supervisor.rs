//! Worker supervision: parent liveness and shutdown signalling.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc;

/// Why a worker stopped serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The parent process went away or was replaced.
    ParentExited { expected: u32, current: u32 },
    /// A termination signal arrived.
    Signal(&'static str),
    /// Shutdown was requested through a [`ShutdownHandle`].
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::ParentExited { expected, current } => {
                write!(f, "parent changed from {expected} to {current}")
            }
            ShutdownReason::Signal(name) => write!(f, "received {name}"),
            ShutdownReason::Requested => write!(f, "shutdown requested"),
        }
    }
}

/// Requests a worker shutdown from outside the worker.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<ShutdownReason>,
}

impl ShutdownHandle {
    pub(crate) fn new(tx: mpsc::Sender<ShutdownReason>) -> Self {
        Self { tx }
    }

    /// Ask the worker to stop. Extra requests after the first are ignored.
    pub fn shutdown(&self) {
        let _ = self.tx.try_send(ShutdownReason::Requested);
    }

    pub(crate) async fn send(&self, reason: ShutdownReason) {
        let _ = self.tx.send(reason).await;
    }
}

/// Detects that the process which spawned the worker is gone.
///
/// When a parent exits its children are re-parented, so a changed parent
/// PID means the worker has been orphaned.
#[derive(Clone)]
pub struct ParentWatch {
    expected: u32,
    probe: Arc<dyn Fn() -> u32 + Send + Sync>,
}

impl ParentWatch {
    /// Watch the real parent of this process.
    #[cfg(unix)]
    pub fn current_process(expected: u32) -> Self {
        Self::with_probe(expected, std::os::unix::process::parent_id)
    }

    /// Watch using a custom parent PID probe.
    pub fn with_probe(expected: u32, probe: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        Self {
            expected,
            probe: Arc::new(probe),
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// The current parent PID if it no longer matches the expected one.
    pub fn orphaned(&self) -> Option<u32> {
        let current = (self.probe)();
        (current != self.expected).then_some(current)
    }
}

impl fmt::Debug for ParentWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentWatch").field("expected", &self.expected).finish()
    }
}

/// Poll `watch` every `interval` and request shutdown once the parent changes.
pub(crate) async fn watch_parent(watch: ParentWatch, interval: Duration, shutdown: ShutdownHandle) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Some(current) = watch.orphaned() {
            warn!(
                "Parent changed from {expected} to {current}, shutting down",
                expected = watch.expected()
            );
            shutdown
                .send(ShutdownReason::ParentExited {
                    expected: watch.expected(),
                    current,
                })
                .await;
            return;
        }
    }
}

/// Request shutdown on Ctrl+C, or SIGTERM on unix.
pub(crate) async fn watch_signals(shutdown: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!("Error setting up SIGTERM handler: {e}");
                return;
            }
        };
        let name = tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => "SIGINT",
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                    return;
                }
            },
            _ = term.recv() => "SIGTERM",
        };
        info!("Received {name}, initiating graceful shutdown");
        shutdown.send(ShutdownReason::Signal(name)).await;
    }

    #[cfg(not(unix))]
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown.send(ShutdownReason::Signal("Ctrl+C")).await;
        }
        Err(e) => error!("Error setting up Ctrl+C handler: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn detects_changed_parent() {
        let parent = Arc::new(AtomicU32::new(100));
        let probe = parent.clone();
        let watch = ParentWatch::with_probe(100, move || probe.load(Ordering::SeqCst));

        assert_eq!(watch.orphaned(), None);
        parent.store(1, Ordering::SeqCst);
        assert_eq!(watch.orphaned(), Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn real_parent_is_alive() {
        let watch = ParentWatch::current_process(std::os::unix::process::parent_id());
        assert_eq!(watch.orphaned(), None);
    }

    #[tokio::test]
    async fn watcher_reports_orphaning() {
        let (tx, mut rx) = mpsc::channel(1);
        let watch = ParentWatch::with_probe(42, || 1);
        tokio::spawn(watch_parent(watch, Duration::from_millis(5), ShutdownHandle::new(tx)));

        let reason = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(reason, Some(ShutdownReason::ParentExited { expected: 42, current: 1 }));
    }
}
