//! Chat model and the per-batch status reducer.

use {
    chrono::{DateTime, Utc},
    papo_transport::{MessageRef, RawMessage},
};

use crate::message::MessageKind;

/// Per-chat reply lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    /// A reply is owed for the current round. Initial state, re-entered on
    /// every new inbound batch.
    AwaitingReply,
    /// The current round was answered. Re-opens on the next inbound message.
    Replied,
    /// The current round was suppressed (group, self-authored, or
    /// unsupported kind). Re-evaluated per batch, not sticky.
    Ignored,
    /// Parked by an administrative action; the message pipeline never sets
    /// this.
    Archived,
}

/// Why an inbound message suppresses the reply round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    GroupChat,
    SelfAuthored,
    UnsupportedKind,
}

/// Pure classification verdict for one inbound message. Applying it to the
/// store is a separate step so classification stays side-effect free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressDecision {
    Engage,
    Ignore(IgnoreReason),
}

impl IngressDecision {
    pub fn decide(message: &RawMessage, kind: MessageKind) -> Self {
        if message.is_group() {
            Self::Ignore(IgnoreReason::GroupChat)
        } else if message.from_me {
            Self::Ignore(IgnoreReason::SelfAuthored)
        } else if !kind.is_supported() {
            Self::Ignore(IgnoreReason::UnsupportedKind)
        } else {
            Self::Engage
        }
    }
}

/// One classified message in a chat's history.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub kind: MessageKind,
    /// Extracted text, or the materialized media path. Empty when neither
    /// applies or extraction failed.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub from_me: bool,
    pub replied: bool,
    pub sender: Option<String>,
    /// Transport key for quoting and reacting.
    pub reference: MessageRef,
    /// Reserved for audio transcription; never set today.
    pub transcription: Option<String>,
}

impl ChatMessage {
    pub fn id(&self) -> &str {
        &self.reference.message_id
    }
}

/// Oldest history is trimmed past this point. Far larger than any context
/// window, so trimming never affects reply decisions.
const MAX_HISTORY: usize = 256;

/// A single counterpart conversation thread.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: String,
    pub status: ChatStatus,
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ChatStatus::AwaitingReply,
            messages: Vec::new(),
        }
    }

    /// Append one inbound message and reduce the status for this round.
    ///
    /// Status always resets to `AwaitingReply` first; the decision may then
    /// downgrade it to `Ignored`. `Archived` is administrative and sticky.
    pub fn apply(&mut self, message: ChatMessage, decision: IngressDecision) {
        if self.status != ChatStatus::Archived {
            self.status = match decision {
                IngressDecision::Engage => ChatStatus::AwaitingReply,
                IngressDecision::Ignore(_) => ChatStatus::Ignored,
            };
        }
        self.messages.push(message);
        if self.messages.len() > MAX_HISTORY {
            let excess = self.messages.len() - MAX_HISTORY;
            self.messages.drain(..excess);
        }
    }

    /// Mark the given messages as answered and close the round.
    pub fn mark_replied(&mut self, message_ids: &[String]) {
        for message in &mut self.messages {
            if message_ids.iter().any(|id| id == message.id()) {
                message.replied = true;
            }
        }
        if self.status != ChatStatus::Archived {
            self.status = ChatStatus::Replied;
        }
    }
}

/// Point-in-time copy handed to the reply pipeline, so no lock is held
/// across backend calls.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub id: String,
    pub status: ChatStatus,
    pub messages: Vec<ChatMessage>,
}
