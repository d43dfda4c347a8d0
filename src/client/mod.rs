//! Protocol client seam.
//!
//! The WhatsApp protocol engine (pairing, encryption, socket framing) lives
//! outside this crate. The runtime talks to it through [`ProtocolClient`]
//! and builds one fresh instance per start attempt through
//! [`ClientFactory`]. The [`sim`] module provides a simulated transport for
//! development and testing.

pub mod sim;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Mode;
use crate::session::AuthMode;
use crate::store::CredentialStore;
use crate::types::{ClientEvent, MessageID, JID};

/// Link-preview metadata attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPreview {
    pub title: String,
    pub body: String,
    pub thumbnail_url: String,
    pub source_url: String,
}

/// Body of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Image {
        url: String,
        caption: String,
        preview: Option<LinkPreview>,
    },
}

/// A message to send through the protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: JID,
    pub body: MessageBody,
}

/// A reaction to attach to a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub message_id: MessageID,
    pub chat: JID,
    pub emoji: String,
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Stream of events from a connected client. The stream ending without a
/// close event is treated as an abnormal disconnect by the lifecycle.
pub type EventStream = mpsc::Receiver<ClientEvent>;

/// Handle to a live protocol client.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Send a message; returns the assigned message ID.
    async fn send_message(&self, message: OutboundMessage) -> Result<MessageID, ClientError>;

    /// Attach a reaction to a received message.
    async fn send_reaction(&self, reaction: Reaction) -> Result<(), ClientError>;

    /// The JID of the account this client is logged in as, once known.
    fn self_jid(&self) -> Option<JID>;

    /// Operating mode the client was started with.
    fn mode(&self) -> Mode;
}

/// Builds and connects a fresh client for one start attempt. Errors here
/// are startup-time failures; the lifecycle treats them as fatal.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        store: &CredentialStore,
        auth: AuthMode,
    ) -> Result<(Arc<dyn ProtocolClient>, EventStream), ClientError>;
}
