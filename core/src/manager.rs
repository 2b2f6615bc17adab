//! Protocol connection managers for Bifrost Mail
//!
//! A [`ConnectionManager`] owns the per-account connection registry for one
//! protocol, opens and supervises long-lived push subscriptions, and drives
//! the reconnect policy when they fail. Production runs two instances: one
//! for IMAP IDLE sessions and one for EWS streaming subscriptions.
//!
//! There is a single start path. It preserves any existing record's attempt
//! bookkeeping and cooldown; a "fresh" start is simply a start with no prior
//! record in the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::collab::{AccountDirectory, CredentialDecryptor, MailCredentials};
use crate::config::PushConfig;
use crate::conn::{ConnectionEvent, Connector};
use crate::dispatch::NotificationDispatcher;
use crate::error::{BifrostError, BifrostResult};
use crate::scheduler::{ReconnectPolicy, RetryAction};
use crate::state::{ConnectionState, Registry};
use crate::types::{
    AccountId, ChangeEvent, ConnectionStatus, ConnectionStatusReport, Protocol, StartReport,
};

/// Connection manager for one mail protocol.
///
/// Cheap to clone; clones share the same registry and configuration.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    protocol: Protocol,
    config: PushConfig,
    policy: ReconnectPolicy,
    registry: Registry,
    connector: Arc<dyn Connector>,
    directory: Arc<dyn AccountDirectory>,
    decryptor: Arc<dyn CredentialDecryptor>,
    dispatcher: Arc<NotificationDispatcher>,
    shutting_down: Arc<AtomicBool>,
}

impl ConnectionManager {
    /// Create a manager for one protocol.
    ///
    /// `shutting_down` is shared with the shutdown coordinator; once set,
    /// no new connection or reconnect work is accepted.
    pub fn new(
        protocol: Protocol,
        config: PushConfig,
        connector: Arc<dyn Connector>,
        directory: Arc<dyn AccountDirectory>,
        decryptor: Arc<dyn CredentialDecryptor>,
        dispatcher: Arc<NotificationDispatcher>,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                protocol,
                policy: ReconnectPolicy::new(config.reconnect.clone()),
                config,
                registry: Registry::new(),
                connector,
                directory,
                decryptor,
                dispatcher,
                shutting_down,
            }),
        }
    }

    /// Protocol this instance manages
    pub fn protocol(&self) -> Protocol {
        self.inner.protocol
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Start pushing for every active account of this protocol.
    ///
    /// Accounts start concurrently; one account failing never aborts the
    /// rest.
    pub async fn start_all(&self) -> StartReport {
        let accounts = match self
            .inner
            .directory
            .list_active_accounts(self.inner.protocol)
            .await
        {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(
                    "Failed to list active {} accounts: {}",
                    self.inner.protocol, e
                );
                return StartReport::default();
            }
        };
        info!(
            "Starting {} push for {} accounts",
            self.inner.protocol,
            accounts.len()
        );

        let folder = self.inner.config.default_folder.clone();
        let results = join_all(
            accounts
                .iter()
                .map(|&account_id| self.start(account_id, &folder)),
        )
        .await;

        let mut report = StartReport::default();
        for (account_id, result) in accounts.iter().zip(results) {
            match result {
                Ok(()) => report.successful += 1,
                Err(e) => {
                    warn!("Failed to start push for account {}: {}", account_id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Open (or re-open) the push connection for one account.
    ///
    /// A no-op success if the account is already active. An existing
    /// inactive record is reused with its attempt bookkeeping preserved; a
    /// missing record is created fresh with zero attempts.
    pub async fn start(&self, account_id: AccountId, folder: &str) -> BifrostResult<()> {
        if self.is_shutting_down() {
            return Err(BifrostError::ShuttingDown);
        }
        let record = self
            .inner
            .registry
            .get_or_insert_with(account_id, || {
                ConnectionState::new(
                    account_id,
                    self.inner.protocol,
                    folder,
                    self.inner.config.reconnect.max_attempts,
                )
            })
            .await;
        self.start_record(&record, Some(folder)).await
    }

    /// The single start path: open a connection for an existing record.
    ///
    /// Holds the record lock for the whole open, which is what serializes
    /// concurrent starts on one account: the loser of the race observes an
    /// already-active record and returns early.
    pub(crate) async fn start_record(
        &self,
        record: &Arc<tokio::sync::Mutex<ConnectionState>>,
        folder: Option<&str>,
    ) -> BifrostResult<()> {
        let mut state = record.lock().await;
        let account_id = state.account_id;

        // A retry or sweep may reach here with a record an explicit stop
        // already deregistered; opening for it would leak a handle nothing
        // can ever close.
        if state.status == ConnectionStatus::Stopped {
            debug!("Account {} was stopped, skipping reopen", account_id);
            return Ok(());
        }
        if state.is_active() {
            debug!("Account {} already active, start is a no-op", account_id);
            return Ok(());
        }
        if state.in_cooldown(Instant::now()) {
            return Err(BifrostError::CoolingDown(account_id));
        }
        if let Some(folder) = folder {
            state.selected_folder = folder.to_string();
        }

        state.status = ConnectionStatus::Connecting;
        match self.open_connection(&mut state).await {
            Ok(()) => {
                state.status = ConnectionStatus::Active;
                state.reconnect_attempts = 0;
                state.reconnect_scheduled = false;
                state.last_error = None;
                info!(
                    "{} push active for account {} (folder {})",
                    self.inner.protocol, account_id, state.selected_folder
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Failed to open {} connection for account {}: {}",
                    self.inner.protocol, account_id, e
                );
                state.note_failure(&e);
                state.status = ConnectionStatus::Disconnected;
                self.apply_retry_policy(&mut state, &e);
                Err(e)
            }
        }
    }

    /// Fetch settings, decrypt, connect within the timeout, and wire up the
    /// event pump. Called with the record lock held.
    async fn open_connection(&self, state: &mut ConnectionState) -> BifrostResult<()> {
        // The old handle must be fully closed before a new one is opened.
        state.stop_event_pump();
        state.close_handle().await;

        let account_id = state.account_id;
        let blob = self.inner.directory.get_encrypted_settings(account_id).await?;
        let credentials = self.inner.decryptor.decrypt(&blob)?;

        let opened = timeout(
            self.inner.config.connect_timeout(),
            self.inner.connector.connect(
                account_id,
                &credentials,
                &state.selected_folder,
                state.watermark.as_ref(),
            ),
        )
        .await
        .map_err(|_| {
            BifrostError::timeout(format!("connect to {} timed out", credentials.host))
        })??;

        state.handle = Some(opened.handle);
        state.event_task =
            Some(self.spawn_event_pump(account_id, Arc::new(credentials), opened.events));
        Ok(())
    }

    /// Pump connection events into the dispatcher.
    ///
    /// Change notifications are batched as they arrive and dispatched on a
    /// separate task, so a slow folder sync never blocks the event stream.
    /// A close or connection error ends the pump and hands the account to
    /// the retry path.
    fn spawn_event_pump(
        &self,
        account_id: AccountId,
        credentials: Arc<MailCredentials>,
        mut events: mpsc::Receiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut buffer = Vec::with_capacity(16);
            loop {
                let received = events.recv_many(&mut buffer, 16).await;
                if received == 0 {
                    // Sender dropped without a close event.
                    manager
                        .handle_disconnect(
                            account_id,
                            BifrostError::protocol("event channel closed"),
                        )
                        .await;
                    return;
                }

                let mut changes: Vec<ChangeEvent> = Vec::new();
                let mut terminal: Option<BifrostError> = None;
                for event in buffer.drain(..) {
                    match event {
                        ConnectionEvent::Change(change) => changes.push(change),
                        ConnectionEvent::Error(message) => {
                            terminal = Some(BifrostError::protocol(message));
                        }
                        ConnectionEvent::Closed { reason } => {
                            terminal = Some(BifrostError::network(
                                reason.unwrap_or_else(|| "connection closed".to_string()),
                            ));
                        }
                    }
                }

                if !changes.is_empty() {
                    let dispatcher = Arc::clone(&manager.inner.dispatcher);
                    let credentials = Arc::clone(&credentials);
                    tokio::spawn(async move {
                        dispatcher.dispatch(account_id, &credentials, &changes).await;
                    });
                }

                if let Some(error) = terminal {
                    manager.handle_disconnect(account_id, error).await;
                    return;
                }
            }
        })
    }

    /// React to a connection-level failure or close reported by the pump
    async fn handle_disconnect(&self, account_id: AccountId, error: BifrostError) {
        let Some(record) = self.inner.registry.get(account_id).await else {
            return;
        };
        let mut state = record.lock().await;
        if state.status == ConnectionStatus::Stopped {
            return;
        }
        warn!(
            "{} connection lost for account {}: {}",
            self.inner.protocol, account_id, error
        );
        state.note_failure(&error);
        state.detach_event_pump();
        state.close_handle().await;
        state.status = ConnectionStatus::Disconnected;
        self.apply_retry_policy(&mut state, &error);
    }

    /// Classify a failure and arm whatever the policy decides.
    /// Called with the record lock held.
    fn apply_retry_policy(&self, state: &mut ConnectionState, error: &BifrostError) {
        if self.is_shutting_down() {
            return;
        }
        let class = error.classify();
        match self.inner.policy.next_action(state, class, Instant::now()) {
            RetryAction::None => {}
            RetryAction::Schedule(delay) => {
                debug!(
                    "Scheduling reconnect for account {} in {:?} (attempt {})",
                    state.account_id, delay, state.reconnect_attempts
                );
                let manager = self.clone();
                let account_id = state.account_id;
                state.retry_task = Some(tokio::spawn(async move {
                    sleep(delay).await;
                    manager.run_scheduled_retry(account_id).await;
                }));
            }
            RetryAction::Cooldown(window) => {
                warn!(
                    "Account {} entering cooldown for {:?} after {:?} failure",
                    state.account_id, window, class
                );
            }
        }
    }

    /// Fired by the retry timer: clear the scheduling guard and re-run the
    /// state-preserving start path.
    async fn run_scheduled_retry(&self, account_id: AccountId) {
        if self.is_shutting_down() {
            return;
        }
        let Some(record) = self.inner.registry.get(account_id).await else {
            return;
        };
        {
            let mut state = record.lock().await;
            if !state.reconnect_scheduled {
                // Canceled by an explicit stop or restart in the meantime.
                return;
            }
            state.reconnect_scheduled = false;
            state.retry_task = None;
            if state.is_active() {
                return;
            }
        }
        if let Err(e) = self.start_record(&record, None).await {
            debug!(
                "Scheduled reconnect for account {} failed: {}",
                account_id, e
            );
        }
    }

    /// Close and re-open an account's connection, preserving its attempt
    /// bookkeeping and cooldown.
    pub async fn restart(&self, account_id: AccountId) -> BifrostResult<()> {
        let record = self
            .inner
            .registry
            .get(account_id)
            .await
            .ok_or(BifrostError::AccountNotFound(account_id))?;
        {
            let mut state = record.lock().await;
            state.cancel_retry();
            state.stop_event_pump();
            state.close_handle().await;
            if state.status != ConnectionStatus::CooldownWait {
                state.status = ConnectionStatus::Disconnected;
            }
        }
        sleep(self.inner.config.settle_delay()).await;
        self.start_record(&record, None).await
    }

    /// Stop pushing for an account and forget its record. Idempotent.
    ///
    /// Cancels any pending retry, interrupts the connection's long-poll
    /// wait, and settles the close before returning.
    pub async fn stop(&self, account_id: AccountId) {
        let Some(record) = self.inner.registry.remove(account_id).await else {
            debug!("Stop for unknown account {} ignored", account_id);
            return;
        };
        let mut state = record.lock().await;
        state.cancel_retry();
        state.stop_event_pump();
        state.close_handle().await;
        state.status = ConnectionStatus::Stopped;
        state.cooldown_until = None;
        info!(
            "Stopped {} push for account {}",
            self.inner.protocol, account_id
        );
    }

    /// Close every account's connection concurrently, waiting for all
    /// closes to settle (successful or logged).
    pub async fn stop_all(&self) {
        let accounts = self.inner.registry.ids().await;
        info!(
            "Stopping {} push for {} accounts",
            self.inner.protocol,
            accounts.len()
        );
        join_all(accounts.into_iter().map(|account_id| self.stop(account_id))).await;
    }

    /// Point-in-time status for one account, if known
    pub async fn status(&self, account_id: AccountId) -> Option<ConnectionStatusReport> {
        let record = self.inner.registry.get(account_id).await?;
        let state = record.lock().await;
        Some(state.report())
    }

    /// Status snapshot across every known account
    pub async fn status_all(&self) -> Vec<(AccountId, ConnectionStatusReport)> {
        let mut reports = Vec::new();
        for (account_id, record) in self.inner.registry.snapshot().await {
            let state = record.lock().await;
            reports.push((account_id, state.report()));
        }
        reports
    }
}
