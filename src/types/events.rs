//! Event types surfaced by the protocol client.
//!
//! A connected client yields exactly one stream of `ClientEvent`s; the
//! lifecycle controller reacts to connection transitions and routes the
//! rest to the registered handlers.

use crate::types::JID;

/// Connection status as reported by the protocol client. The controller
/// reacts to transitions but never owns or persists this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// Normal logout by user
    LoggedOut,
    /// Connection replaced by another device
    Replaced,
    /// Server requested disconnect
    ServerRequested,
    /// Network error
    NetworkError(String),
    /// Unknown reason
    Unknown,
}

impl DisconnectReason {
    /// Terminal reasons halt the lifecycle instead of triggering a restart.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

/// Information about a received message
#[derive(Debug, Clone)]
pub struct MessageInfo {
    /// Unique message ID
    pub id: String,
    /// Sender JID
    pub sender: JID,
    /// Chat JID (same as sender for 1:1, group JID for groups)
    pub chat: JID,
    /// Whether this message was sent by us
    pub is_from_me: bool,
    /// Whether this is a group message
    pub is_group: bool,
    /// Timestamp of the message
    pub timestamp: i64,
    /// Push name of sender
    pub push_name: Option<String>,
}

/// Content of a received message
#[derive(Debug, Clone)]
pub enum MessageContent {
    /// Text message
    Text(String),
    /// Media message (image, video, audio, document)
    Media {
        url: String,
        caption: Option<String>,
        mimetype: String,
    },
    /// Unknown/unsupported message type
    Unknown,
}

/// A received message
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub info: MessageInfo,
    pub content: MessageContent,
}

/// An ordered batch of messages delivered together by the protocol client.
#[derive(Debug, Clone, Default)]
pub struct MessageBatch {
    pub messages: Vec<IncomingMessage>,
}

impl MessageBatch {
    pub fn new(messages: Vec<IncomingMessage>) -> Self {
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Incoming call notification
#[derive(Debug, Clone)]
pub struct CallEvent {
    /// Call ID
    pub id: String,
    /// Caller JID
    pub from: JID,
    /// Timestamp of the call offer
    pub timestamp: i64,
}

/// Group membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// Group membership update event
#[derive(Debug, Clone)]
pub struct GroupUpdate {
    /// The group the update applies to
    pub group: JID,
    /// Affected participants
    pub participants: Vec<JID>,
    pub action: GroupAction,
}

/// All events surfaced by a connected protocol client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection state transition, with a reason when closing.
    Connection {
        state: ConnectionState,
        reason: Option<DisconnectReason>,
    },
    /// The client rotated its credential material; the payload is the
    /// serialized state to persist before processing continues.
    CredentialsRotated(Vec<u8>),
    /// A pairing payload to render for interactive login.
    PairingCode(String),
    /// A batch of received messages.
    Messages(MessageBatch),
    /// An incoming call offer.
    Call(CallEvent),
    /// A group membership change.
    Group(GroupUpdate),
}
