//! The per-batch reply pipeline.
//!
//! Sequence for every inbound batch: sync into the store (concurrent
//! classification, ordered appends), mark the batch read, then run one reply
//! round per touched chat. A round only happens for chats left in
//! `AwaitingReply` with a non-empty awaiting set, and always resolves to
//! exactly one transport action: a text reply, a reaction, or the apology.
//! Every failure below the transport tier degrades to logging and the
//! apology path; nothing here may crash the event loop.

use std::sync::Arc;

use {
    async_trait::async_trait,
    papo_archive::MessageArchive,
    papo_chats::{ChatMessage, ChatStatus, ChatStore},
    papo_protocol::{ContextBuilder, ReplyAction, ReplyContract},
    papo_reasoning::ReasoningService,
    papo_transport::{
        HistorySync, InboundHandler, MessageBatch, MessageRef, PresenceState, TransportSession,
    },
    tracing::{debug, info, warn},
};

/// Fixed reply sent when the backend fails or answers off-grammar.
pub const DEFAULT_APOLOGY: &str = "Desculpe, houve um erro ao processar sua resposta.";

pub struct ChatOrchestrator {
    store: Arc<ChatStore>,
    context: ContextBuilder,
    contract: ReplyContract,
    reasoning: Arc<dyn ReasoningService>,
    archive: Option<Arc<dyn MessageArchive>>,
    apology: String,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<ChatStore>,
        context: ContextBuilder,
        contract: ReplyContract,
        reasoning: Arc<dyn ReasoningService>,
    ) -> Self {
        Self {
            store,
            context,
            contract,
            reasoning,
            archive: None,
            apology: DEFAULT_APOLOGY.into(),
        }
    }

    /// Forward history-sync feeds to this archive.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn MessageArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    #[must_use]
    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        self.apology = apology.into();
        self
    }

    /// Run one reply round for a chat.
    ///
    /// Short-circuits unless the chat is in `AwaitingReply` with messages
    /// actually awaiting an answer, so re-running for a replied or ignored
    /// chat is a no-op and costs no reasoning call.
    pub async fn run_chat(&self, session: &Arc<dyn TransportSession>, chat_id: &str) {
        let Some(chat) = self.store.snapshot(chat_id) else {
            return;
        };
        if chat.status != ChatStatus::AwaitingReply {
            debug!(chat_id, status = ?chat.status, "round suppressed");
            return;
        }

        let context = self.context.build(&chat);
        let Some(target) = context.last_awaiting().cloned() else {
            debug!(chat_id, "nothing awaiting a reply");
            return;
        };

        if let Err(e) = session
            .set_presence(chat_id, PresenceState::Available)
            .await
        {
            debug!(chat_id, error = %e, "presence update failed");
        }

        let prompt = self.contract.prompt_for(&context);
        if let Err(e) = session
            .set_presence(chat_id, PresenceState::Composing)
            .await
        {
            debug!(chat_id, error = %e, "presence update failed");
        }

        let action = match self.reasoning.reply(&prompt).await {
            Ok(raw) => self.contract.parse(&raw).action(),
            Err(e) => {
                warn!(chat_id, error = %e, "reasoning call failed, falling back to apology");
                ReplyAction::Apology
            },
        };

        let dispatched = self.dispatch(session, chat_id, &target, &action).await;
        match dispatched {
            Ok(()) => {
                let replied_ids: Vec<String> = context
                    .awaiting
                    .iter()
                    .map(|m| m.id().to_owned())
                    .collect();
                self.store.mark_replied(chat_id, &replied_ids);
                info!(chat_id, answered = replied_ids.len(), "round replied");
            },
            Err(e) => {
                // The round stays open; the next inbound batch retries it.
                warn!(chat_id, error = %e, "dispatch failed, round left open");
            },
        }
    }

    async fn dispatch(
        &self,
        session: &Arc<dyn TransportSession>,
        chat_id: &str,
        target: &ChatMessage,
        action: &ReplyAction,
    ) -> papo_transport::error::Result<()> {
        match action {
            ReplyAction::Text(text) => {
                session
                    .send_text(chat_id, text, Some(&target.reference))
                    .await
            },
            ReplyAction::Reaction(glyph) => {
                session.send_reaction(chat_id, glyph, &target.reference).await
            },
            ReplyAction::Apology => {
                session
                    .send_text(chat_id, &self.apology, Some(&target.reference))
                    .await
            },
        }
    }
}

#[async_trait]
impl InboundHandler for ChatOrchestrator {
    async fn handle_batch(&self, session: Arc<dyn TransportSession>, batch: MessageBatch) {
        let keys: Vec<MessageRef> = batch.messages.iter().map(|m| m.reference()).collect();

        let outcome = self.store.sync_batch(batch).await;
        for issue in &outcome.issues {
            warn!(
                chat_id = %issue.chat_id,
                message_id = %issue.message_id,
                detail = %issue.detail,
                "message ingested with issue"
            );
        }

        if !keys.is_empty()
            && let Err(e) = session.mark_read(&keys).await
        {
            warn!(error = %e, "mark-read failed");
        }

        for chat_id in &outcome.touched {
            self.run_chat(&session, chat_id).await;
        }
    }

    async fn handle_history(&self, sync: HistorySync) {
        let Some(archive) = &self.archive else {
            return;
        };
        for chat in &sync.chats {
            if let Err(e) = archive.upsert_chat(chat).await {
                warn!(chat_id = %chat.id, error = %e, "chat upsert failed");
            }
        }
        for contact in &sync.contacts {
            if let Err(e) = archive.upsert_contact(contact).await {
                warn!(contact_id = %contact.id, error = %e, "contact upsert failed");
            }
        }
        for message in &sync.messages {
            if let Err(e) = archive.upsert_message(message).await {
                warn!(message_id = %message.id, error = %e, "message upsert failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use papo_transport::{BatchType, RawMessage};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text {
            chat_id: String,
            text: String,
            quoted: Option<String>,
        },
        Reaction {
            chat_id: String,
            glyph: String,
            message_id: String,
        },
        Read(usize),
        Presence(PresenceState),
    }

    #[derive(Default)]
    struct RecordingSession {
        sent: Mutex<Vec<Sent>>,
        fail_sends: std::sync::atomic::AtomicBool,
    }

    impl RecordingSession {
        fn sends(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<Sent> {
            self.sends()
                .into_iter()
                .filter(|s| matches!(s, Sent::Text { .. } | Sent::Reaction { .. }))
                .collect()
        }
    }

    #[async_trait]
    impl TransportSession for RecordingSession {
        async fn send_text(
            &self,
            chat_id: &str,
            text: &str,
            quoted: Option<&MessageRef>,
        ) -> papo_transport::error::Result<()> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(papo_transport::error::Error::send_failed("offline"));
            }
            self.sent.lock().unwrap().push(Sent::Text {
                chat_id: chat_id.into(),
                text: text.into(),
                quoted: quoted.map(|q| q.message_id.clone()),
            });
            Ok(())
        }

        async fn send_reaction(
            &self,
            chat_id: &str,
            glyph: &str,
            target: &MessageRef,
        ) -> papo_transport::error::Result<()> {
            self.sent.lock().unwrap().push(Sent::Reaction {
                chat_id: chat_id.into(),
                glyph: glyph.into(),
                message_id: target.message_id.clone(),
            });
            Ok(())
        }

        async fn mark_read(&self, keys: &[MessageRef]) -> papo_transport::error::Result<()> {
            self.sent.lock().unwrap().push(Sent::Read(keys.len()));
            Ok(())
        }

        async fn set_presence(
            &self,
            _chat_id: &str,
            state: PresenceState,
        ) -> papo_transport::error::Result<()> {
            self.sent.lock().unwrap().push(Sent::Presence(state));
            Ok(())
        }
    }

    struct ScriptedReasoning {
        reply: papo_reasoning::Result<String>,
        calls: AtomicU32,
    }

    impl ScriptedReasoning {
        fn text(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_owned()),
                calls: AtomicU32::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(papo_reasoning::Error::MissingReply),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReasoningService for ScriptedReasoning {
        async fn reply(&self, _prompt: &str) -> papo_reasoning::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(papo_reasoning::Error::MissingReply),
            }
        }
    }

    fn orchestrator(reasoning: Arc<ScriptedReasoning>) -> ChatOrchestrator {
        ChatOrchestrator::new(
            Arc::new(ChatStore::new(64)),
            ContextBuilder::default(),
            ReplyContract::default(),
            reasoning,
        )
    }

    fn text_message(id: &str, chat_id: &str, from_me: bool, body: &str) -> RawMessage {
        RawMessage {
            id: id.into(),
            chat_id: chat_id.into(),
            from_me,
            push_name: Some("Ana".into()),
            timestamp: 1714000000,
            payload: serde_json::json!({"conversation": body}),
        }
    }

    fn batch(messages: Vec<RawMessage>) -> MessageBatch {
        MessageBatch {
            batch_type: BatchType::Notify,
            messages,
        }
    }

    #[tokio::test]
    async fn text_round_replies_quoting_the_last_awaiting_message() {
        let reasoning = ScriptedReasoning::text("- type: text\n- response: Oi Ana!");
        let orchestrator = orchestrator(Arc::clone(&reasoning));
        let recording = Arc::new(RecordingSession::default());
        let session: Arc<dyn TransportSession> = Arc::clone(&recording) as _;

        orchestrator
            .handle_batch(
                session,
                batch(vec![
                    text_message("m1", "c1", true, "fui no mercado"),
                    text_message("m2", "c1", true, "volto já"),
                    text_message("m3", "c1", true, "ok?"),
                    text_message("m4", "c1", false, "tá bom"),
                    text_message("m5", "c1", false, "me avisa"),
                ]),
            )
            .await;

        assert_eq!(reasoning.calls(), 1);
        assert_eq!(
            recording.texts(),
            vec![Sent::Text {
                chat_id: "c1".into(),
                text: "Oi Ana!".into(),
                quoted: Some("m5".into()),
            }]
        );

        let snap = orchestrator.store.snapshot("c1").unwrap();
        assert_eq!(snap.status, ChatStatus::Replied);
        assert!(snap.messages.iter().all(|m| m.replied));
    }

    #[tokio::test]
    async fn reaction_round_dispatches_the_mapped_glyph() {
        let reasoning = ScriptedReasoning::text("- type: reaction\n- response: :like:");
        let orchestrator = orchestrator(Arc::clone(&reasoning));
        let recording = Arc::new(RecordingSession::default());
        let session: Arc<dyn TransportSession> = Arc::clone(&recording) as _;

        orchestrator
            .handle_batch(session, batch(vec![text_message("m1", "c1", false, "kkkk")]))
            .await;

        assert_eq!(
            recording.texts(),
            vec![Sent::Reaction {
                chat_id: "c1".into(),
                glyph: "\u{1F44D}".into(),
                message_id: "m1".into(),
            }]
        );
        assert_eq!(
            orchestrator.store.snapshot("c1").unwrap().status,
            ChatStatus::Replied
        );
    }

    #[tokio::test]
    async fn off_grammar_reply_sends_the_apology_and_still_closes_the_round() {
        let reasoning = ScriptedReasoning::text("I don't know");
        let orchestrator = orchestrator(Arc::clone(&reasoning));
        let recording = Arc::new(RecordingSession::default());

        orchestrator
            .handle_batch(
                Arc::clone(&recording) as _,
                batch(vec![text_message("m1", "c1", false, "e aí?")]),
            )
            .await;

        assert_eq!(
            recording.texts(),
            vec![Sent::Text {
                chat_id: "c1".into(),
                text: DEFAULT_APOLOGY.into(),
                quoted: Some("m1".into()),
            }]
        );
        assert_eq!(
            orchestrator.store.snapshot("c1").unwrap().status,
            ChatStatus::Replied
        );
    }

    #[tokio::test]
    async fn reasoning_failure_falls_back_to_the_apology() {
        let reasoning = ScriptedReasoning::failing();
        let orchestrator = orchestrator(Arc::clone(&reasoning));
        let recording = Arc::new(RecordingSession::default());

        orchestrator
            .handle_batch(
                Arc::clone(&recording) as _,
                batch(vec![text_message("m1", "c1", false, "oi")]),
            )
            .await;

        assert_eq!(reasoning.calls(), 1);
        assert!(matches!(
            recording.texts().as_slice(),
            [Sent::Text { text, .. }] if text == DEFAULT_APOLOGY
        ));
    }

    #[tokio::test]
    async fn group_and_self_authored_batches_issue_no_reasoning_call() {
        let reasoning = ScriptedReasoning::text("- type: text\n- response: nunca");
        let orchestrator = orchestrator(Arc::clone(&reasoning));
        let recording = Arc::new(RecordingSession::default());

        orchestrator
            .handle_batch(
                Arc::clone(&recording) as _,
                batch(vec![
                    text_message("m1", "123@g.us", false, "oi grupo"),
                    text_message("m2", "c1", true, "nota pra mim"),
                ]),
            )
            .await;

        assert_eq!(reasoning.calls(), 0);
        assert!(recording.texts().is_empty());
        assert_eq!(
            orchestrator.store.snapshot("123@g.us").unwrap().status,
            ChatStatus::Ignored
        );
    }

    #[tokio::test]
    async fn rerunning_a_replied_chat_is_a_no_op() {
        let reasoning = ScriptedReasoning::text("- type: text\n- response: Oi!");
        let orchestrator = orchestrator(Arc::clone(&reasoning));
        let recording = Arc::new(RecordingSession::default());
        let session: Arc<dyn TransportSession> = Arc::clone(&recording) as _;

        orchestrator
            .handle_batch(
                Arc::clone(&session),
                batch(vec![text_message("m1", "c1", false, "oi")]),
            )
            .await;
        assert_eq!(reasoning.calls(), 1);

        // No new inbound messages: the status check short-circuits.
        orchestrator.run_chat(&session, "c1").await;
        assert_eq!(reasoning.calls(), 1);
        assert_eq!(recording.texts().len(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_leaves_the_round_open() {
        let reasoning = ScriptedReasoning::text("- type: text\n- response: Oi!");
        let orchestrator = orchestrator(Arc::clone(&reasoning));
        let recording = Arc::new(RecordingSession::default());
        recording.fail_sends.store(true, Ordering::SeqCst);

        orchestrator
            .handle_batch(
                Arc::clone(&recording) as _,
                batch(vec![text_message("m1", "c1", false, "oi")]),
            )
            .await;

        let snap = orchestrator.store.snapshot("c1").unwrap();
        assert_eq!(snap.status, ChatStatus::AwaitingReply);
        assert!(!snap.messages[0].replied);
    }

    #[tokio::test]
    async fn batch_is_marked_read_and_presence_cycles() {
        let reasoning = ScriptedReasoning::text("- type: text\n- response: Oi!");
        let orchestrator = orchestrator(reasoning);
        let recording = Arc::new(RecordingSession::default());

        orchestrator
            .handle_batch(
                Arc::clone(&recording) as _,
                batch(vec![
                    text_message("m1", "c1", false, "oi"),
                    text_message("m2", "c1", false, "oi??"),
                ]),
            )
            .await;

        let sends = recording.sends();
        assert!(sends.contains(&Sent::Read(2)));
        assert!(sends.contains(&Sent::Presence(PresenceState::Available)));
        assert!(sends.contains(&Sent::Presence(PresenceState::Composing)));
    }
}
