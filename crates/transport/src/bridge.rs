//! WebSocket client for the messaging bridge process.
//!
//! The bridge owns the actual messaging session; papo speaks JSON frames to
//! it over a single socket. Inbound frames become [`TransportEvent`]s on a
//! bounded channel; outbound commands are correlated with `ack` frames by id
//! so callers learn whether a send was accepted.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    session::{Transport, TransportEvent, TransportSession},
    types::{
        BridgeCommand, BridgeEvent, CommandFrame, ConnectionPhase, ConnectionUpdate, MessageRef,
        PresenceState,
    },
};

/// How long to wait for the bridge to acknowledge a command.
const ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the inbound event channel. Consumption is single-loop, so this
/// bounds how far the bridge can run ahead of the dispatcher.
const EVENT_BUFFER: usize = 256;

struct AckResult {
    success: bool,
    error: Option<String>,
}

/// Commands awaiting an `ack` frame, keyed by frame id. Synchronous map
/// operations only, never held across an await.
type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<AckResult>>>>;

/// Client for a bridge process listening on a WebSocket URL.
pub struct BridgeTransport {
    url: String,
}

impl BridgeTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn connect(
        &self,
        credentials: Option<serde_json::Value>,
    ) -> Result<(Arc<dyn TransportSession>, mpsc::Receiver<TransportEvent>)> {
        info!(url = %self.url, "connecting to messaging bridge");
        let (ws_stream, _response) = connect_async(&self.url).await?;
        let (mut ws_sink, ws_reader) = ws_stream.split();

        // First frame restores the prior session or starts a fresh pairing.
        let init = CommandFrame {
            id: uuid::Uuid::new_v4().to_string(),
            command: BridgeCommand::Init { credentials },
        };
        ws_sink
            .send(Message::Text(serde_json::to_string(&init)?.into()))
            .await?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (write_tx, write_rx) = mpsc::unbounded_channel::<String>();
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(pump(
            ws_sink,
            ws_reader,
            event_tx,
            write_rx,
            Arc::clone(&pending),
        ));

        let session = Arc::new(BridgeSession { write_tx, pending });
        Ok((session, event_rx))
    }
}

/// Outbound half of a live bridge connection.
pub struct BridgeSession {
    write_tx: mpsc::UnboundedSender<String>,
    pending: PendingAcks,
}

impl BridgeSession {
    async fn submit(&self, command: BridgeCommand) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let frame = CommandFrame {
            id: id.clone(),
            command,
        };
        let json = serde_json::to_string(&frame)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(id.clone(), ack_tx);
        }

        if self.write_tx.send(json).is_err() {
            self.forget(&id);
            return Err(Error::connection_closed("bridge write channel closed"));
        }

        match tokio::time::timeout(ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(ack)) if ack.success => Ok(()),
            Ok(Ok(ack)) => Err(Error::send_failed(
                ack.error.unwrap_or_else(|| "bridge rejected command".into()),
            )),
            Ok(Err(_)) => Err(Error::connection_closed(
                "bridge closed before acknowledging",
            )),
            Err(_) => {
                self.forget(&id);
                Err(Error::send_failed("acknowledgement timed out"))
            },
        }
    }

    fn forget(&self, id: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(id);
    }
}

#[async_trait]
impl TransportSession for BridgeSession {
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        quoted: Option<&MessageRef>,
    ) -> Result<()> {
        self.submit(BridgeCommand::SendText {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            quoted_id: quoted.map(|q| q.message_id.clone()),
        })
        .await
    }

    async fn send_reaction(&self, chat_id: &str, glyph: &str, target: &MessageRef) -> Result<()> {
        self.submit(BridgeCommand::SendReaction {
            chat_id: chat_id.to_string(),
            glyph: glyph.to_string(),
            message_id: target.message_id.clone(),
        })
        .await
    }

    async fn mark_read(&self, keys: &[MessageRef]) -> Result<()> {
        self.submit(BridgeCommand::Read {
            keys: keys.to_vec(),
        })
        .await
    }

    async fn set_presence(&self, chat_id: &str, state: PresenceState) -> Result<()> {
        self.submit(BridgeCommand::Presence {
            chat_id: chat_id.to_string(),
            state,
        })
        .await
    }
}

/// Forward frames bidirectionally until the socket or the consumer goes away.
async fn pump(
    mut ws_sink: impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    mut ws_reader: impl StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
    + Unpin,
    event_tx: mpsc::Sender<TransportEvent>,
    mut write_rx: mpsc::UnboundedReceiver<String>,
    pending: PendingAcks,
) {
    let mut closed_by_peer = false;

    loop {
        tokio::select! {
            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&text, &event_tx, &pending).await.is_err() {
                            // Consumer dropped the receiver; stop pumping.
                            break;
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if ws_sink.send(Message::Pong(data)).await.is_err() {
                            closed_by_peer = true;
                            break;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("bridge socket closed");
                        closed_by_peer = true;
                        break;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        warn!(error = %e, "bridge socket error");
                        closed_by_peer = true;
                        break;
                    },
                }
            },
            json = write_rx.recv() => {
                match json {
                    Some(text) => {
                        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                            warn!(error = %e, "bridge write failed");
                            closed_by_peer = true;
                            break;
                        }
                    },
                    None => {
                        // Session handle dropped; close cleanly.
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    },
                }
            },
        }
    }

    // Unblock any callers still waiting on an ack.
    {
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.clear();
    }

    if closed_by_peer {
        // Surface socket death as a generic close so the supervisor applies
        // its reconnect policy.
        let _ = event_tx
            .send(TransportEvent::Connection(ConnectionUpdate {
                connection: Some(ConnectionPhase::Close),
                qr: None,
                status_code: None,
                message: Some("bridge socket closed".into()),
            }))
            .await;
    }
}

/// Dispatch one inbound frame. `Err` means the event receiver is gone.
async fn handle_frame(
    text: &str,
    event_tx: &mpsc::Sender<TransportEvent>,
    pending: &PendingAcks,
) -> std::result::Result<(), ()> {
    let event = match serde_json::from_str::<BridgeEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "malformed bridge frame");
            return Ok(());
        },
    };

    let mapped = match event {
        BridgeEvent::Ack { id, success, error } => {
            let sender = {
                let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.remove(&id)
            };
            match sender {
                Some(tx) => {
                    let _ = tx.send(AckResult { success, error });
                },
                None => debug!(id, "ack for unknown command"),
            }
            return Ok(());
        },
        BridgeEvent::MessageBatch(batch) => TransportEvent::Batch(batch),
        BridgeEvent::Connection(update) => TransportEvent::Connection(update),
        BridgeEvent::Credentials { blob } => TransportEvent::Credentials(blob),
        BridgeEvent::HistorySync(sync) => TransportEvent::HistorySync(sync),
    };

    event_tx.send(mapped).await.map_err(|_| ())
}
