//! Bounded in-memory chat registry.
//!
//! Chats live in an LRU cache keyed by conversation id; eviction is decoupled
//! from correctness (an evicted chat simply restarts its history on the next
//! message). Batch ingestion classifies and materializes messages
//! concurrently, then appends under per-chat locks in arrival order. One
//! message's failure never aborts its siblings.

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use {
    chrono::{DateTime, Utc},
    lru::LruCache,
    papo_transport::{MessageBatch, RawMessage},
    tracing::debug,
};

use crate::{
    chat::{Chat, ChatMessage, ChatSnapshot, IngressDecision},
    media::{MediaFetcher, MediaStore},
    message::{self, MessageKind},
};

/// Default cache capacity in chats.
pub const DEFAULT_CAPACITY: usize = 1024;

/// One message that failed during batch sync. The message is still appended
/// (with empty content); the issue is reported for logging.
#[derive(Debug)]
pub struct SyncIssue {
    pub chat_id: String,
    pub message_id: String,
    pub detail: String,
}

/// Result of ingesting one batch.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Chats touched by the batch, deduplicated, in first-touch order.
    pub touched: Vec<String>,
    pub issues: Vec<SyncIssue>,
}

/// Per-message classification work, done concurrently before any lock is
/// taken.
struct Prepared {
    raw: RawMessage,
    kind: MessageKind,
    content: String,
    issue: Option<String>,
}

pub struct ChatStore {
    // Synchronous map operations only, never held across an await.
    chats: Mutex<LruCache<String, Arc<Mutex<Chat>>>>,
    media: Option<(MediaStore, Arc<dyn MediaFetcher>)>,
}

impl ChatStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN));
        Self {
            chats: Mutex::new(LruCache::new(capacity)),
            media: None,
        }
    }

    /// Enable media materialization for media-kind messages.
    #[must_use]
    pub fn with_media(mut self, store: MediaStore, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.media = Some((store, fetcher));
        self
    }

    /// Ingest one inbound batch.
    ///
    /// Classification and media materialization run concurrently per message;
    /// appends then apply strictly in arrival order so per-chat history
    /// matches delivery. Failures are collected per message, never fatal.
    pub async fn sync_batch(&self, batch: MessageBatch) -> SyncOutcome {
        let prepared = futures::future::join_all(
            batch
                .messages
                .into_iter()
                .map(|message| self.prepare(message)),
        )
        .await;

        let mut outcome = SyncOutcome::default();
        for mut prepared in prepared {
            // Reported through the outcome; the caller owns logging.
            if let Some(detail) = prepared.issue.take() {
                outcome.issues.push(SyncIssue {
                    chat_id: prepared.raw.chat_id.clone(),
                    message_id: prepared.raw.id.clone(),
                    detail,
                });
            }
            let chat_id = prepared.raw.chat_id.clone();
            self.append(prepared);
            if !outcome.touched.contains(&chat_id) {
                outcome.touched.push(chat_id);
            }
        }
        outcome
    }

    /// Classify one message and extract or materialize its content. The only
    /// suspension point is the media fetch.
    async fn prepare(&self, raw: RawMessage) -> Prepared {
        let kind = MessageKind::classify(&raw);

        if kind.is_media() {
            let Some((store, fetcher)) = &self.media else {
                return Prepared {
                    raw,
                    kind,
                    content: String::new(),
                    issue: Some("media handling disabled".into()),
                };
            };
            return match store.materialize(&raw, kind, fetcher.as_ref()).await {
                Ok(path) => Prepared {
                    raw,
                    kind,
                    content: path,
                    issue: None,
                },
                Err(e) => Prepared {
                    raw,
                    kind,
                    content: String::new(),
                    issue: Some(e.to_string()),
                },
            };
        }

        let content = message::extract_text(kind, &raw).unwrap_or_default();
        Prepared {
            raw,
            kind,
            content,
            issue: None,
        }
    }

    /// Append one prepared message under its chat's lock and reduce status.
    fn append(&self, prepared: Prepared) {
        let decision = IngressDecision::decide(&prepared.raw, prepared.kind);
        let message = ChatMessage {
            kind: prepared.kind,
            content: prepared.content,
            timestamp: DateTime::<Utc>::from_timestamp(prepared.raw.timestamp, 0)
                .unwrap_or_default(),
            from_me: prepared.raw.from_me,
            replied: prepared.raw.from_me,
            sender: prepared.raw.push_name.clone(),
            reference: prepared.raw.reference(),
            transcription: None,
        };

        let entry = self.entry(&prepared.raw.chat_id);
        let mut chat = entry.lock().unwrap_or_else(|e| e.into_inner());
        chat.apply(message, decision);
        debug!(
            chat_id = %chat.id,
            kind = ?prepared.kind,
            status = ?chat.status,
            "message appended"
        );
    }

    /// Fetch or create the entry for a chat id, promoting it in the LRU.
    fn entry(&self, chat_id: &str) -> Arc<Mutex<Chat>> {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = chats.get(chat_id) {
            return Arc::clone(entry);
        }
        let entry = Arc::new(Mutex::new(Chat::new(chat_id)));
        chats.push(chat_id.to_owned(), Arc::clone(&entry));
        entry
    }

    /// Point-in-time copy of a chat, or `None` if it was never seen (or has
    /// been evicted).
    pub fn snapshot(&self, chat_id: &str) -> Option<ChatSnapshot> {
        let entry = {
            let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(chats.get(chat_id)?)
        };
        let chat = entry.lock().unwrap_or_else(|e| e.into_inner());
        Some(ChatSnapshot {
            id: chat.id.clone(),
            status: chat.status,
            messages: chat.messages.clone(),
        })
    }

    /// Mark the given messages answered and close the chat's round.
    pub fn mark_replied(&self, chat_id: &str, message_ids: &[String]) {
        let entry = {
            let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
            match chats.get(chat_id) {
                Some(entry) => Arc::clone(entry),
                None => return,
            }
        };
        let mut chat = entry.lock().unwrap_or_else(|e| e.into_inner());
        chat.mark_replied(message_ids);
    }

    pub fn len(&self) -> usize {
        self.chats.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
