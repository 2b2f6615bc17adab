//! Background health monitor for push connections
//!
//! Periodically sweeps a manager's registry, repairing two situations the
//! event-driven paths cannot see: connections that look open but have lost
//! their subscription, and accounts whose cooldown window has lapsed.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::manager::ConnectionManager;
use crate::types::ConnectionStatus;

/// Periodic sweeper over one manager's accounts
pub struct HealthMonitor {
    task: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitor. The first sweep runs one full interval after
    /// startup, not immediately.
    pub fn spawn(manager: ConnectionManager, sweep_interval: Duration) -> Self {
        info!(
            "Health monitor for {} push sweeping every {:?}",
            manager.protocol(),
            sweep_interval
        );
        let task = tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if manager.is_shutting_down() {
                    return;
                }
                sweep(&manager).await;
            }
        });
        Self { task }
    }

    /// Stop sweeping
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One pass over every known account.
///
/// Reconnects accounts whose cooldown just lapsed (with the attempt
/// counter reset), tears down and reopens half-open connections, and picks up
/// disconnected accounts with no pending retry. Accounts mid-cooldown,
/// mid-retry, stopped, or healthy are left alone.
pub(crate) async fn sweep(manager: &ConnectionManager) {
    if manager.is_shutting_down() {
        return;
    }
    let now = Instant::now();
    let mut candidates = Vec::new();
    for (account_id, record) in manager.registry().snapshot().await {
        let needs_restart = {
            let mut state = record.lock().await;
            match state.status {
                ConnectionStatus::Stopped | ConnectionStatus::Connecting => false,
                _ if state.reconnect_scheduled => false,
                _ if state.in_cooldown(now) => false,
                ConnectionStatus::CooldownWait => {
                    info!(
                        "Cooldown lapsed for account {}, resuming reconnect attempts",
                        account_id
                    );
                    state.cooldown_until = None;
                    state.reconnect_attempts = 0;
                    true
                }
                ConnectionStatus::Active => {
                    if state.is_subscribed() {
                        false
                    } else {
                        warn!(
                            "Connection for account {} lost its subscription, reconnecting",
                            account_id
                        );
                        state.stop_event_pump();
                        state.close_handle().await;
                        state.status = ConnectionStatus::Disconnected;
                        true
                    }
                }
                ConnectionStatus::Disconnected | ConnectionStatus::Idle => true,
            }
        };
        if needs_restart {
            candidates.push((account_id, record));
        }
    }

    // Opens run concurrently: one hanging host must not hold up another
    // account's recovery in the same sweep.
    join_all(candidates.into_iter().map(|(account_id, record)| async move {
        if let Err(e) = manager.start_record(&record, None).await {
            debug!("Health sweep reconnect for account {} failed: {}", account_id, e);
        }
    }))
    .await;
}
