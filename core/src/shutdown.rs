//! Coordinated shutdown of push managers and monitors
//!
//! One coordinator owns the shared shutdown flag. Raising it stops new
//! connection and reconnect work everywhere, then every registered manager
//! closes its connections concurrently and the health monitors stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::info;

use crate::error::BifrostResult;
use crate::health::HealthMonitor;
use crate::manager::ConnectionManager;

pub struct ShutdownCoordinator {
    flag: Arc<AtomicBool>,
    managers: Vec<ConnectionManager>,
    monitors: Vec<HealthMonitor>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            managers: Vec::new(),
            monitors: Vec::new(),
        }
    }

    /// The flag to hand to every manager built for this process
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    pub fn register_manager(&mut self, manager: ConnectionManager) {
        self.managers.push(manager);
    }

    pub fn register_monitor(&mut self, monitor: HealthMonitor) {
        self.monitors.push(monitor);
    }

    /// Block until a termination signal arrives, then shut everything down
    pub async fn run(self) -> BifrostResult<()> {
        wait_for_signal().await?;
        self.shutdown().await;
        Ok(())
    }

    /// Stop accepting work, close every connection, stop the monitors.
    ///
    /// Waits for all closes to settle so servers see clean logouts rather
    /// than dropped sockets.
    pub async fn shutdown(&self) {
        info!("Shutting down push connections");
        self.flag.store(true, Ordering::SeqCst);
        for monitor in &self.monitors {
            monitor.stop();
        }
        join_all(self.managers.iter().map(|manager| manager.stop_all())).await;
        info!("Push shutdown complete");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> BifrostResult<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    tokio::select! {
        _ = interrupt.recv() => info!("Received SIGINT"),
        _ = terminate.recv() => info!("Received SIGTERM"),
        _ = quit.recv() => info!("Received SIGQUIT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> BifrostResult<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    Ok(())
}
