//! External collaborator contracts for the push core
//!
//! The push core does not speak wire protocols, decrypt credentials, or
//! fetch folder contents itself; it drives those concerns through these
//! traits. Production wires in the real account store, crypto, and sync
//! engine; tests substitute fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BifrostResult;
use crate::types::{AccountId, FolderDescriptor, Protocol};

/// Decrypted account settings used to open a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailCredentials {
    /// Server hostname
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login username
    pub username: String,
    /// Login password
    pub password: String,
    /// Whether to use TLS
    pub use_ssl: bool,
}

/// Encrypted account settings blob as stored by the account store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSettings(pub Vec<u8>);

/// Result of one bounded folder synchronization
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    /// Number of messages fetched or updated
    pub message_count: u32,
}

/// Account enumeration and settings lookup
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// List the active accounts configured for a protocol
    async fn list_active_accounts(&self, protocol: Protocol) -> BifrostResult<Vec<AccountId>>;

    /// Fetch the encrypted settings blob for an account
    async fn get_encrypted_settings(
        &self,
        account_id: AccountId,
    ) -> BifrostResult<EncryptedSettings>;
}

/// Credential decryption
pub trait CredentialDecryptor: Send + Sync {
    /// Decrypt an encrypted settings blob.
    ///
    /// Fails with a decryption error if the blob is malformed or the key
    /// is wrong.
    fn decrypt(&self, settings: &EncryptedSettings) -> BifrostResult<MailCredentials>;
}

/// Folder-content synchronization and count persistence
#[async_trait]
pub trait FolderSynchronizer: Send + Sync {
    /// Fetch and persist message changes for one folder of one account
    async fn sync_folder(
        &self,
        account_id: AccountId,
        credentials: &MailCredentials,
        folder: &str,
        limit: u32,
    ) -> BifrostResult<SyncOutcome>;

    /// List folder metadata for an account
    async fn list_folders(&self, account_id: AccountId) -> BifrostResult<Vec<FolderDescriptor>>;

    /// Persist unread/total counts for a folder
    async fn update_folder_counts(
        &self,
        account_id: AccountId,
        folder_id: &str,
        unread: u32,
        total: u32,
    ) -> BifrostResult<()>;
}
