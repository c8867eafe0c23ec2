//! The worker: accept loop, connection pool and supervision.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::server::app::Application;
use crate::server::config::WorkerConfig;
use crate::server::connection::Connection;
use crate::server::environ::ConnectionInfo;
use crate::server::error::Error;
use crate::server::pool::{PoolSlot, WorkerPool};
use crate::server::supervisor::{watch_parent, watch_signals, ParentWatch, ShutdownHandle, ShutdownReason};

/// Serves an application on a listening socket it was handed.
pub struct Worker {
    config: Arc<WorkerConfig>,
    app: Arc<dyn Application>,
    listener: std::net::TcpListener,
    pool: WorkerPool,
    parent: Option<ParentWatch>,
    handle_signals: bool,
    shutdown: ShutdownHandle,
    shutdown_rx: mpsc::Receiver<ShutdownReason>,
}

impl Worker {
    /// Create a worker for an already bound listener.
    ///
    /// When `config.parent_pid` is set the worker watches that process and
    /// stops once it is no longer the parent.
    pub fn new(listener: std::net::TcpListener, app: Arc<dyn Application>, config: WorkerConfig) -> Result<Self, Error> {
        config.validate()?;
        listener.set_nonblocking(true)?;

        #[cfg(unix)]
        let parent = config.parent_pid.map(ParentWatch::current_process);
        #[cfg(not(unix))]
        let parent = None;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Ok(Self {
            pool: WorkerPool::new(config.max_connections),
            config: Arc::new(config),
            app,
            listener,
            parent,
            handle_signals: false,
            shutdown: ShutdownHandle::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Replace the parent liveness check.
    pub fn with_parent_watch(mut self, watch: ParentWatch) -> Self {
        self.parent = Some(watch);
        self
    }

    /// Stop gracefully on SIGINT/SIGTERM.
    pub fn with_signal_handling(mut self) -> Self {
        self.handle_signals = true;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// The connection pool, for observing load.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept and serve connections until shutdown is requested.
    pub async fn run(mut self) -> Result<ShutdownReason, Error> {
        let listener = TcpListener::from_std(self.listener)?;
        let local = listener.local_addr()?;
        info!(
            "Worker {pid} listening on http://{local} (max {max} connections)",
            pid = std::process::id(),
            max = self.pool.capacity()
        );

        let mut supervisors = JoinSet::new();
        if let Some(watch) = self.parent.take() {
            info!("Watching parent process {pid}", pid = watch.expected());
            supervisors.spawn(watch_parent(watch, self.config.parent_check_interval, self.shutdown.clone()));
        }
        if self.handle_signals {
            supervisors.spawn(watch_signals(self.shutdown.clone()));
        }

        let mut tasks = JoinSet::new();
        let reason = loop {
            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    error!("Connection task failed: {e}");
                }
            }

            let mut slot = tokio::select! {
                reason = self.shutdown_rx.recv() => break reason.unwrap_or(ShutdownReason::Requested),
                slot = self.pool.reserve() => match slot {
                    Some(slot) => slot,
                    None => break ShutdownReason::Requested,
                },
            };

            tokio::select! {
                reason = self.shutdown_rx.recv() => break reason.unwrap_or(ShutdownReason::Requested),
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        slot.activate();
                        let info = ConnectionInfo {
                            peer,
                            local,
                            server_name: self.config.server_name.clone(),
                        };
                        tasks.spawn(serve(socket, info, slot, self.app.clone(), self.config.clone()));
                    }
                    Err(e) => Self::handle_accept_error(e).await,
                },
            }
        };

        info!("Shutting down worker: {reason}");
        drop(listener);
        self.pool.close();
        supervisors.shutdown().await;
        Self::perform_shutdown(&mut tasks, self.config.graceful_timeout).await;

        Ok(reason)
    }

    /// Accept errors such as running out of file descriptors are transient.
    async fn handle_accept_error(e: std::io::Error) {
        error!("Error accepting connection: {e}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    /// Let in-flight connections finish, then abort whatever is left.
    async fn perform_shutdown(tasks: &mut JoinSet<()>, grace: Duration) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let drained = tokio::time::timeout(grace, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Connection task failed during shutdown: {e}");
                }
            }
        })
        .await;

        if drained.is_err() {
            info!("Aborting {len} connections still open after the grace period", len = tasks.len());
            tasks.shutdown().await;
        }
        info!("Worker shutdown complete");
    }
}

async fn serve(socket: TcpStream, info: ConnectionInfo, slot: PoolSlot, app: Arc<dyn Application>, config: Arc<WorkerConfig>) {
    let _slot = slot;
    let peer = info.peer;
    if let Err(e) = socket.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {peer}: {e}");
    }
    debug!("Accepted connection from {peer}");
    let mut connection = Connection::new(socket, info, app, config);
    let served = connection.run().await;
    debug!("Connection from {peer} closed after {served} requests");
}
