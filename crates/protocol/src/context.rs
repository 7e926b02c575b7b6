//! Sliding-window context rendering.

use papo_chats::{ChatMessage, ChatSnapshot};

/// Section header for messages already part of the conversation.
const HISTORY_HEADER: &str = "Recent conversation:";
/// Section header for counterpart messages still owed an answer.
const AWAITING_HEADER: &str = "Messages awaiting a reply:";

/// Label used for self-authored messages.
const SELF_LABEL: &str = "me";

/// A chat's history rendered for the reasoning backend.
#[derive(Debug, Clone)]
pub struct RenderedContext {
    /// Deterministic textual rendering of the window, both sections.
    pub prompt: String,
    /// Counterpart messages in the window still owed an answer, oldest
    /// first. Empty means the reasoning call must be skipped entirely.
    pub awaiting: Vec<ChatMessage>,
}

impl RenderedContext {
    /// The message a reply should quote or react to: the newest one still
    /// awaiting an answer.
    pub fn last_awaiting(&self) -> Option<&ChatMessage> {
        self.awaiting.last()
    }
}

/// Turns a chat snapshot into a bounded, ordered prompt.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    window: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self { window: 15 }
    }
}

impl ContextBuilder {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// Render the most recent messages of `chat` into a prompt.
    ///
    /// The window is partitioned into history (self-authored, already
    /// replied, or of a kind no reply is owed for) and awaiting-reply
    /// (counterpart, unreplied, supported kind). Both sections keep arrival
    /// order.
    pub fn build(&self, chat: &ChatSnapshot) -> RenderedContext {
        let start = chat.messages.len().saturating_sub(self.window);
        let window = &chat.messages[start..];

        let mut history = Vec::new();
        let mut awaiting = Vec::new();
        for message in window {
            if !message.from_me && !message.replied && message.kind.is_supported() {
                awaiting.push(message.clone());
            } else {
                history.push(message.clone());
            }
        }

        let mut prompt = String::new();
        prompt.push_str(HISTORY_HEADER);
        prompt.push('\n');
        for message in &history {
            prompt.push_str(&render_line(chat, message));
            prompt.push('\n');
        }
        prompt.push('\n');
        prompt.push_str(AWAITING_HEADER);
        prompt.push('\n');
        for message in &awaiting {
            prompt.push_str(&render_line(chat, message));
            prompt.push('\n');
        }

        RenderedContext { prompt, awaiting }
    }
}

/// `[timestamp][sender] content`, RFC 3339 timestamp, "me" for self-authored
/// messages, push name (or the conversation id) for the counterpart.
fn render_line(chat: &ChatSnapshot, message: &ChatMessage) -> String {
    let sender = if message.from_me {
        SELF_LABEL
    } else {
        message.sender.as_deref().unwrap_or(&chat.id)
    };
    format!(
        "[{}][{}] {}",
        message.timestamp.to_rfc3339(),
        sender,
        message.content
    )
}
