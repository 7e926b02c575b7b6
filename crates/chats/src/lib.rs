//! Chat sessions: message classification, per-chat status lifecycle, and the
//! bounded in-memory registry the reply pipeline reads from.

pub mod chat;
pub mod error;
pub mod media;
pub mod message;
pub mod store;

pub use {
    chat::{Chat, ChatMessage, ChatSnapshot, ChatStatus, IgnoreReason, IngressDecision},
    error::{Error, Result},
    media::{DisabledMediaFetcher, InlineMediaFetcher, MediaFetcher, MediaStore},
    message::MessageKind,
    store::{ChatStore, SyncIssue, SyncOutcome},
};
