//! Bifrost Mail push core
//!
//! Keeps long-lived push connections to mail servers alive: IMAP IDLE
//! sessions and EWS streaming subscriptions. One [`ConnectionManager`] per
//! protocol supervises a registry of per-account connections, turns raw
//! server notifications into folder syncs through the host application's
//! collaborators, and recovers from failures with classified backoff,
//! cooldown windows, and a periodic health sweep.

pub mod collab;
pub mod config;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod manager;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

pub use collab::{
    AccountDirectory, CredentialDecryptor, EncryptedSettings, FolderSynchronizer, MailCredentials,
    SyncOutcome,
};
pub use config::{HealthConfig, PushConfig, ReconnectConfig};
pub use conn::{ConnectionEvent, ConnectionHandle, Connector, OpenConnection};
pub use dispatch::NotificationDispatcher;
pub use error::{BifrostError, BifrostResult, FailureClass};
pub use health::HealthMonitor;
pub use manager::ConnectionManager;
pub use shutdown::ShutdownCoordinator;
pub use types::{
    AccountId, ChangeEvent, ConnectionStatus, ConnectionStatusReport, FolderDescriptor, Protocol,
    StartReport, Watermark,
};

/// Application name
pub const APP_NAME: &str = "Bifrost Mail";

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base retry delay in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Retry delay ceiling in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Random jitter added to each retry delay, in milliseconds
pub const DEFAULT_JITTER_MS: u64 = 250;

/// Reconnect attempts before a cooldown
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Cooldown after exhausting the attempt ceiling, in seconds (15 minutes)
pub const DEFAULT_FAILURE_COOLDOWN_SECS: u64 = 900;

/// Cooldown after a permanent failure, in seconds (30 minutes)
pub const DEFAULT_PERMANENT_COOLDOWN_SECS: u64 = 1_800;

/// Health monitor sweep interval in seconds
pub const DEFAULT_HEALTH_SWEEP_SECS: u64 = 60;

/// Connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Delay between closing a connection and reopening it, in milliseconds
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Folder assumed when a notification does not name one
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Per-folder message limit passed to the sync collaborator
pub const DEFAULT_SYNC_LIMIT: u32 = 50;
