//! Protocol connection abstraction for the push core
//!
//! The IMAP and EWS client libraries live outside this crate. They plug in
//! through [`Connector`] and deliver notifications over an event channel,
//! which decouples the manager's state machine from whatever callback shape
//! the underlying library uses.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::collab::MailCredentials;
use crate::error::BifrostResult;
use crate::types::{AccountId, ChangeEvent, Watermark};

/// Event emitted by a live protocol connection
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A mailbox change notification
    Change(ChangeEvent),
    /// Connection-level error; the connection is no longer usable
    Error(String),
    /// The server or library closed the connection
    Closed { reason: Option<String> },
}

/// A freshly opened connection: the owned handle plus its event stream
pub struct OpenConnection {
    /// Exclusively owned handle to the underlying connection
    pub handle: Box<dyn ConnectionHandle>,
    /// Channel carrying change notifications and close/error events
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// Opens protocol connections: handshake, login, folder subscription
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection for an account and subscribe to the given folder.
    ///
    /// `resume` carries the last watermark for protocols that can resume
    /// notification delivery after a gap (EWS streaming subscriptions).
    async fn connect(
        &self,
        account_id: AccountId,
        credentials: &MailCredentials,
        folder: &str,
        resume: Option<&Watermark>,
    ) -> BifrostResult<OpenConnection>;
}

/// Handle to a live connection or subscription
#[async_trait]
pub trait ConnectionHandle: Send {
    /// Whether the folder subscription is currently established
    fn is_subscribed(&self) -> bool;

    /// Latest resume cursor, for protocols that supply one
    fn watermark(&self) -> Option<Watermark> {
        None
    }

    /// Stop listening (IDLE DONE or unsubscribe), then log out and release
    /// the socket or subscription. Interrupts any outstanding long-poll
    /// wait on the connection.
    async fn shutdown(&mut self) -> BifrostResult<()>;
}
