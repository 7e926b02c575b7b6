//! Wire types exchanged with the messaging bridge.

use serde::{Deserialize, Serialize};

/// Disconnect status code meaning "restart required" (transient, retry at once).
pub const STATUS_RESTART_REQUIRED: u16 = 515;
/// Disconnect status code meaning the session was logged out remotely.
pub const STATUS_LOGGED_OUT: u16 = 401;

/// Conversation id suffix marking a group chat.
pub const GROUP_SUFFIX: &str = "@g.us";

/// A single inbound message as delivered by the bridge.
///
/// `payload` is the raw kind-keyed message body (e.g. `{"conversation": "hi"}`
/// or `{"imageMessage": {...}}`). It is kept verbatim so later quoting and
/// reacting can reference the original transport payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub chat_id: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawMessage {
    /// Whether this message belongs to a group conversation.
    pub fn is_group(&self) -> bool {
        self.chat_id.ends_with(GROUP_SUFFIX)
    }

    /// Key for quoting or reacting to this message.
    pub fn reference(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id.clone(),
            message_id: self.id.clone(),
        }
    }
}

/// Stable reference to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: String,
    pub message_id: String,
}

/// How a batch of messages was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    /// Fresh messages pushed in real time.
    Notify,
    /// Messages appended from device sync or history catch-up.
    Append,
    #[serde(other)]
    Unknown,
}

/// A batch of inbound messages delivered together in one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBatch {
    pub batch_type: BatchType,
    pub messages: Vec<RawMessage>,
}

/// Connection phase reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Open,
    Close,
    Connecting,
}

/// A connection-state update from the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub connection: Option<ConnectionPhase>,
    /// Pairing code payload, present while a QR scan is required.
    #[serde(default)]
    pub qr: Option<String>,
    /// Status code of the last disconnect, when `connection` is `Close`.
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Why the transport session dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Protocol-level hiccup. Reconnect immediately, no backoff.
    RestartRequired,
    /// Credentials were invalidated remotely. They must be wiped, never retried.
    LoggedOut,
    /// Anything else. Consumes retry budget.
    Other(Option<u16>),
}

impl DisconnectReason {
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(STATUS_RESTART_REQUIRED) => Self::RestartRequired,
            Some(STATUS_LOGGED_OUT) => Self::LoggedOut,
            other => Self::Other(other),
        }
    }
}

/// Presence indicator shown to the counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Available,
    Composing,
    Paused,
    Unavailable,
}

/// Public connection lifecycle state, readable by the operational surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Waiting for the pairing code to be scanned.
    Pairing { qr: String },
    Connecting,
    Connected,
    /// Session was logged out remotely; a fresh pairing is required.
    LoggedOut,
}

impl ConnectionState {
    /// Current pairing code, if one is being displayed.
    pub fn qr_code(&self) -> Option<&str> {
        match self {
            Self::Pairing { qr } => Some(qr),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short label for health reporting.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Pairing { .. } => "pairing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::LoggedOut => "logged_out",
        }
    }
}

/// Chat document from a history sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Contact document from a history sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notify: Option<String>,
}

/// Bulk history feed emitted after pairing or device sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistorySync {
    #[serde(default)]
    pub chats: Vec<ChatDocument>,
    #[serde(default)]
    pub contacts: Vec<ContactDocument>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// Frames received from the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    MessageBatch(MessageBatch),
    Connection(ConnectionUpdate),
    /// Rotated credential blob. Must be persisted before further events are
    /// processed.
    Credentials { blob: serde_json::Value },
    HistorySync(HistorySync),
    /// Result of a previously issued command.
    Ack {
        id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Commands sent to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// First frame after the socket opens. Restores a prior session when a
    /// credential blob is supplied, otherwise starts a fresh pairing.
    Init {
        credentials: Option<serde_json::Value>,
    },
    SendText {
        chat_id: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        quoted_id: Option<String>,
    },
    SendReaction {
        chat_id: String,
        glyph: String,
        message_id: String,
    },
    Read {
        keys: Vec<MessageRef>,
    },
    Presence {
        chat_id: String,
        state: PresenceState,
    },
}

/// Envelope for outbound commands, correlated with `Ack` events by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    pub id: String,
    #[serde(flatten)]
    pub command: BridgeCommand,
}
