//! Shared types for the Bifrost Mail push core

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable account identifier, foreign to the external account store
pub type AccountId = uuid::Uuid;

/// Mail protocol driven by a connection manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// IMAP with IDLE-style long-poll subscriptions
    Imap,
    /// Exchange Web Services streaming subscriptions
    Ews,
}

impl Protocol {
    /// Short lowercase protocol name
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Imap => "imap",
            Protocol::Ews => "ews",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of one account's push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Record exists but no connection attempt is underway
    Idle,
    /// A connection open is in flight
    Connecting,
    /// Connection established and subscribed
    Active,
    /// Connection lost; a retry may be scheduled
    Disconnected,
    /// Inside a cooldown window; normal retries suppressed
    CooldownWait,
    /// Explicitly stopped; the record is being removed
    Stopped,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::CooldownWait => "cooldown_wait",
            ConnectionStatus::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Server-supplied resume cursor for EWS streaming subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark(pub String);

/// Raw change notification emitted by a protocol connection.
///
/// The EWS-flavored item events cannot always resolve a folder name; the
/// dispatcher falls back to the configured default folder for those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new message arrived in a folder
    NewMessage { folder: String },
    /// A message was removed from a folder
    MessageDeleted { folder: String },
    /// Message flags changed in a folder
    FlagsChanged { folder: String },
    /// An item was created
    ItemCreated { folder: Option<String> },
    /// An item was modified
    ItemModified { folder: Option<String> },
    /// An item was moved between folders
    ItemMoved {
        from: Option<String>,
        to: Option<String>,
    },
}

/// Folder metadata returned by the folder-sync collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    /// Stable folder identifier in the external store
    pub id: String,
    /// Folder display name as the protocol reports it
    pub name: String,
    /// Unread message count
    pub unread: u32,
    /// Total message count
    pub total: u32,
}

/// Point-in-time status of one account's push connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusReport {
    /// Current lifecycle status
    pub status: ConnectionStatus,
    /// Whether a live connection handle exists
    pub active: bool,
    /// Whether the folder subscription is actually established
    pub subscribed: bool,
    /// Last observed failure, if any
    pub last_error: Option<String>,
    /// Wall-clock time of the last failure
    pub last_failure_at: Option<time::OffsetDateTime>,
}

/// Outcome of a start-all sweep over the active accounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StartReport {
    /// Accounts whose connection opened
    pub successful: usize,
    /// Accounts whose open attempt failed
    pub failed: usize,
}
