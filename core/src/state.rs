//! Per-account connection state and the in-memory registry

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use crate::conn::ConnectionHandle;
use crate::error::BifrostError;
use crate::types::{
    AccountId, ConnectionStatus, ConnectionStatusReport, Protocol, Watermark,
};

/// Per-account connection state machine record.
///
/// Exactly one record exists per account per manager; all mutation happens
/// behind the record's mutex, so different accounts proceed concurrently
/// while one account's transitions stay serialized.
pub struct ConnectionState {
    /// Account this record belongs to
    pub account_id: AccountId,
    /// Protocol, carried for logging and diagnostics
    pub protocol: Protocol,
    /// Current lifecycle status
    pub status: ConnectionStatus,
    /// Exclusively owned handle to the live connection, if any
    pub(crate) handle: Option<Box<dyn ConnectionHandle>>,
    /// Folder currently subscribed to
    pub selected_folder: String,
    /// Reconnect attempts since the last successful open
    pub reconnect_attempts: u32,
    /// Attempt ceiling before a cooldown
    pub max_reconnect_attempts: u32,
    /// True while a delayed retry task is pending
    pub reconnect_scheduled: bool,
    /// While set and in the future, normal reconnects are suppressed
    pub cooldown_until: Option<Instant>,
    /// Last observed failure, for diagnostics and classification
    pub last_error: Option<String>,
    /// Wall-clock time of the last failure
    pub last_failure_at: Option<time::OffsetDateTime>,
    /// Resume cursor captured from the last closed connection
    pub watermark: Option<Watermark>,
    /// Task pumping connection events into the dispatcher
    pub(crate) event_task: Option<JoinHandle<()>>,
    /// Pending delayed-retry task
    pub(crate) retry_task: Option<JoinHandle<()>>,
}

impl ConnectionState {
    /// Create a fresh record in the `Idle` state
    pub fn new(
        account_id: AccountId,
        protocol: Protocol,
        folder: &str,
        max_reconnect_attempts: u32,
    ) -> Self {
        Self {
            account_id,
            protocol,
            status: ConnectionStatus::Idle,
            handle: None,
            selected_folder: folder.to_string(),
            reconnect_attempts: 0,
            max_reconnect_attempts,
            reconnect_scheduled: false,
            cooldown_until: None,
            last_error: None,
            last_failure_at: None,
            watermark: None,
            event_task: None,
            retry_task: None,
        }
    }

    /// Whether the record is inside an unexpired cooldown window
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Active with a live connection handle
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active && self.handle.is_some()
    }

    /// Active and actually subscribed (not half-open)
    pub fn is_subscribed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_subscribed())
    }

    /// Point-in-time status report for this record
    pub fn report(&self) -> ConnectionStatusReport {
        ConnectionStatusReport {
            status: self.status,
            active: self.is_active(),
            subscribed: self.is_subscribed(),
            last_error: self.last_error.clone(),
            last_failure_at: self.last_failure_at,
        }
    }

    /// Record a failure for diagnostics
    pub(crate) fn note_failure(&mut self, error: &BifrostError) {
        self.last_error = Some(error.to_string());
        self.last_failure_at = Some(time::OffsetDateTime::now_utc());
    }

    /// Cancel a pending delayed retry, if any
    pub(crate) fn cancel_retry(&mut self) {
        self.reconnect_scheduled = false;
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
    }

    /// Abort the event pump task
    pub(crate) fn stop_event_pump(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }

    /// Forget the event pump without aborting it.
    ///
    /// Used when the pump itself reported the disconnect: it is already
    /// winding down, and aborting it here would cancel the caller.
    pub(crate) fn detach_event_pump(&mut self) {
        self.event_task.take();
    }

    /// Close the live handle, capturing its watermark first.
    ///
    /// Close failures are logged; the handle is cleared either way so a
    /// new one can be opened.
    pub(crate) async fn close_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Some(watermark) = handle.watermark() {
                self.watermark = Some(watermark);
            }
            if let Err(e) = handle.shutdown().await {
                warn!(
                    "Failed to close {} connection for account {}: {}",
                    self.protocol, self.account_id, e
                );
            }
        }
    }
}

impl Drop for ConnectionState {
    fn drop(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        if self.handle.is_some() {
            warn!(
                "Connection state for account {} dropped with a live handle",
                self.account_id
            );
        }
    }
}

/// In-memory table of per-account records, owned by one manager instance
pub(crate) struct Registry {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<ConnectionState>>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Look up an account's record
    pub(crate) async fn get(&self, account_id: AccountId) -> Option<Arc<Mutex<ConnectionState>>> {
        self.accounts.read().await.get(&account_id).cloned()
    }

    /// Fetch an account's record, creating it if missing.
    ///
    /// An existing record is returned as-is so in-flight attempt counters
    /// and cooldowns survive restarts.
    pub(crate) async fn get_or_insert_with(
        &self,
        account_id: AccountId,
        make: impl FnOnce() -> ConnectionState,
    ) -> Arc<Mutex<ConnectionState>> {
        let mut accounts = self.accounts.write().await;
        accounts
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(make())))
            .clone()
    }

    /// Remove an account's record
    pub(crate) async fn remove(
        &self,
        account_id: AccountId,
    ) -> Option<Arc<Mutex<ConnectionState>>> {
        self.accounts.write().await.remove(&account_id)
    }

    /// Known account ids
    pub(crate) async fn ids(&self) -> Vec<AccountId> {
        self.accounts.read().await.keys().copied().collect()
    }

    /// Snapshot of all records for iteration outside the map lock
    pub(crate) async fn snapshot(&self) -> Vec<(AccountId, Arc<Mutex<ConnectionState>>)> {
        self.accounts
            .read()
            .await
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }
}
