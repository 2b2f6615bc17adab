//! Error types for the Bifrost Mail push core

use crate::types::AccountId;

/// Result type alias for push core operations
pub type BifrostResult<T> = Result<T, BifrostError>;

/// Main error type for the push core
#[derive(Debug, thiserror::Error)]
pub enum BifrostError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Transient network failures (resets, temporary DNS blips)
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The remote host actively refused the connection
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The remote host could not be resolved or reached at all
    #[error("Host unreachable: {0}")]
    HostUnreachable(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Credential decryption failed (malformed blob or wrong key)
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Protocol-level failure on an established connection
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Folder synchronization failure
    #[error("Sync error: {0}")]
    Sync(String),

    /// Account is not known to the registry
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account is inside an unexpired cooldown window
    #[error("Account {0} is cooling down")]
    CoolingDown(AccountId),

    /// The manager is shutting down and accepts no new work
    #[error("Shutting down")]
    ShuttingDown,

    /// Invalid state errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classification driving the reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retried on the normal exponential-backoff ladder
    Transient,
    /// Skips the ladder: extended cooldown, attempts forced to the ceiling
    Permanent,
    /// Retryable (the operator may fix credentials), bounded like transients
    Auth,
}

impl BifrostError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a new decryption error
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new sync error
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Classify a failure for the reconnect policy.
    ///
    /// Classification happens once, at failure time; a permanent verdict
    /// stands regardless of how later sweeps read the same record.
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::ConnectionRefused(_) | Self::HostUnreachable(_) => FailureClass::Permanent,
            Self::Io(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::HostUnreachable
                        | std::io::ErrorKind::NetworkUnreachable
                ) =>
            {
                FailureClass::Permanent
            }
            Self::Authentication(_) | Self::Decryption(_) => FailureClass::Auth,
            _ => FailureClass::Transient,
        }
    }

    /// Check if this failure bypasses the backoff ladder entirely
    pub fn is_permanent(&self) -> bool {
        self.classify() == FailureClass::Permanent
    }

    /// Check if this is an authentication-related failure
    pub fn is_auth_error(&self) -> bool {
        self.classify() == FailureClass::Auth
    }
}
