//! Hand-rolled fakes shared by the manager, dispatcher, and health tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::collab::{
    AccountDirectory, CredentialDecryptor, EncryptedSettings, FolderSynchronizer, MailCredentials,
    SyncOutcome,
};
use crate::conn::{ConnectionEvent, ConnectionHandle, Connector, OpenConnection};
use crate::error::{BifrostError, BifrostResult};
use crate::types::{AccountId, FolderDescriptor, Protocol, Watermark};

/// Fixed credentials used by every fake connection
pub fn credentials() -> MailCredentials {
    MailCredentials {
        host: "mail.example.com".to_string(),
        port: 993,
        username: "user@example.com".to_string(),
        password: "secret".to_string(),
        use_ssl: true,
    }
}

/// Directory serving a fixed account list and a canned settings blob
pub struct FakeDirectory {
    pub accounts: Vec<AccountId>,
}

#[async_trait]
impl AccountDirectory for FakeDirectory {
    async fn list_active_accounts(&self, _protocol: Protocol) -> BifrostResult<Vec<AccountId>> {
        Ok(self.accounts.clone())
    }

    async fn get_encrypted_settings(
        &self,
        _account_id: AccountId,
    ) -> BifrostResult<EncryptedSettings> {
        Ok(EncryptedSettings(b"blob".to_vec()))
    }
}

/// Decryptor returning the fixed test credentials
pub struct FakeDecryptor;

impl CredentialDecryptor for FakeDecryptor {
    fn decrypt(&self, _settings: &EncryptedSettings) -> BifrostResult<MailCredentials> {
        Ok(credentials())
    }
}

/// Synchronizer recording every call it receives
pub struct RecordingSynchronizer {
    pub sync_calls: Mutex<Vec<String>>,
    pub count_updates: Mutex<Vec<(String, u32, u32)>>,
    failing_folders: Mutex<Vec<String>>,
    folders: Vec<FolderDescriptor>,
}

impl RecordingSynchronizer {
    pub fn new() -> Self {
        Self::with_folders(vec![
            descriptor("fa", "A"),
            descriptor("fb", "B"),
            descriptor("fi", "INBOX"),
        ])
    }

    pub fn with_folders(folders: Vec<FolderDescriptor>) -> Self {
        Self {
            sync_calls: Mutex::new(Vec::new()),
            count_updates: Mutex::new(Vec::new()),
            failing_folders: Mutex::new(Vec::new()),
            folders,
        }
    }

    /// Make syncs of the named folder fail
    pub fn fail_folder(&self, folder: &str) {
        self.failing_folders.lock().unwrap().push(folder.to_string());
    }
}

fn descriptor(id: &str, name: &str) -> FolderDescriptor {
    FolderDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        unread: 1,
        total: 2,
    }
}

#[async_trait]
impl FolderSynchronizer for RecordingSynchronizer {
    async fn sync_folder(
        &self,
        _account_id: AccountId,
        _credentials: &MailCredentials,
        folder: &str,
        _limit: u32,
    ) -> BifrostResult<SyncOutcome> {
        self.sync_calls.lock().unwrap().push(folder.to_string());
        if self.failing_folders.lock().unwrap().iter().any(|f| f == folder) {
            return Err(BifrostError::sync(format!("sync of {folder} failed")));
        }
        Ok(SyncOutcome { message_count: 1 })
    }

    async fn list_folders(&self, _account_id: AccountId) -> BifrostResult<Vec<FolderDescriptor>> {
        Ok(self.folders.clone())
    }

    async fn update_folder_counts(
        &self,
        _account_id: AccountId,
        folder_id: &str,
        unread: u32,
        total: u32,
    ) -> BifrostResult<()> {
        self.count_updates
            .lock()
            .unwrap()
            .push((folder_id.to_string(), unread, total));
        Ok(())
    }
}

/// Connector with a scripted queue of failures; once the queue is drained,
/// every connect succeeds and hands out a fake handle plus event sender.
pub struct ScriptedConnector {
    pub connects: AtomicUsize,
    /// Live fake handles that have not been shut down
    pub open_handles: Arc<AtomicUsize>,
    /// Whether newly opened handles report an established subscription
    pub subscribed: AtomicBool,
    /// Whether fake handles fail their shutdown call
    pub fail_shutdown: AtomicBool,
    /// Resume cursor carried by newly opened handles
    pub handle_watermark: Mutex<Option<String>>,
    /// Resume cursor offered on each connect attempt, in order
    pub resumes: Mutex<Vec<Option<String>>>,
    failures: Mutex<VecDeque<BifrostError>>,
    hanging: Mutex<Vec<AccountId>>,
    senders: Mutex<Vec<mpsc::Sender<ConnectionEvent>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            open_handles: Arc::new(AtomicUsize::new(0)),
            subscribed: AtomicBool::new(true),
            fail_shutdown: AtomicBool::new(false),
            handle_watermark: Mutex::new(None),
            resumes: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            hanging: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failure for the next connect attempt
    pub fn fail_next(&self, error: BifrostError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Queue `count` transient network failures
    pub fn fail_next_transient(&self, count: usize) {
        for _ in 0..count {
            self.fail_next(BifrostError::network("connection reset"));
        }
    }

    /// Make every connect for the given account hang until the connect
    /// timeout cancels it
    pub fn hang_account(&self, account_id: AccountId) {
        self.hanging.lock().unwrap().push(account_id);
    }

    /// Number of successful connects so far
    pub fn successful_connects(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    /// Event sender of the most recent successful connect
    pub fn latest_sender(&self) -> mpsc::Sender<ConnectionEvent> {
        self.senders
            .lock()
            .unwrap()
            .last()
            .expect("no successful connect yet")
            .clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        account_id: AccountId,
        _credentials: &MailCredentials,
        _folder: &str,
        resume: Option<&Watermark>,
    ) -> BifrostResult<OpenConnection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.resumes
            .lock()
            .unwrap()
            .push(resume.map(|w| w.0.clone()));
        if self.hanging.lock().unwrap().contains(&account_id) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let (tx, rx) = mpsc::channel(32);
        self.senders.lock().unwrap().push(tx);
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(OpenConnection {
            handle: Box::new(FakeHandle {
                subscribed: self.subscribed.load(Ordering::SeqCst),
                fail_shutdown: self.fail_shutdown.load(Ordering::SeqCst),
                watermark: self.handle_watermark.lock().unwrap().clone(),
                open: Arc::clone(&self.open_handles),
                closed: false,
            }),
            events: rx,
        })
    }
}

/// Handle backing a scripted connection
pub struct FakeHandle {
    subscribed: bool,
    fail_shutdown: bool,
    watermark: Option<String>,
    open: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl ConnectionHandle for FakeHandle {
    fn is_subscribed(&self) -> bool {
        self.subscribed && !self.closed
    }

    fn watermark(&self) -> Option<Watermark> {
        self.watermark.clone().map(Watermark)
    }

    async fn shutdown(&mut self) -> BifrostResult<()> {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail_shutdown {
            return Err(BifrostError::protocol("logout failed"));
        }
        Ok(())
    }
}
