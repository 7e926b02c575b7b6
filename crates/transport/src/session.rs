//! Session traits at the transport seam.

use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    error::Result,
    types::{HistorySync, MessageBatch, MessageRef, PresenceState},
};

/// Typed inbound events, consumed by a single dispatcher loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Batch(MessageBatch),
    Connection(crate::types::ConnectionUpdate),
    Credentials(serde_json::Value),
    HistorySync(HistorySync),
}

/// Outbound operations on a live transport session.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Send a text reply, optionally quoting an earlier message.
    async fn send_text(&self, chat_id: &str, text: &str, quoted: Option<&MessageRef>)
    -> Result<()>;

    /// React to a message with an emoji glyph.
    async fn send_reaction(&self, chat_id: &str, glyph: &str, target: &MessageRef) -> Result<()>;

    /// Mark messages as read.
    async fn mark_read(&self, keys: &[MessageRef]) -> Result<()>;

    /// Update the presence indicator for a chat.
    async fn set_presence(&self, chat_id: &str, state: PresenceState) -> Result<()>;
}

/// Connection factory. Implemented by the bridge client; test doubles
/// implement it to drive the supervisor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a session, restoring from `credentials` when present.
    /// Returns the outbound session handle and the inbound event stream.
    async fn connect(
        &self,
        credentials: Option<serde_json::Value>,
    ) -> Result<(Arc<dyn TransportSession>, mpsc::Receiver<TransportEvent>)>;
}

/// Consumer of inbound traffic. Implementations recover from their own
/// failures by logging and skipping; nothing here may tear down the
/// connection loop.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Process one batch of inbound messages.
    async fn handle_batch(&self, session: Arc<dyn TransportSession>, batch: MessageBatch);

    /// Process a bulk history feed. Default implementation ignores it.
    async fn handle_history(&self, _sync: HistorySync) {}
}
