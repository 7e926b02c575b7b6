//! Connection lifecycle supervisor.
//!
//! Owns the transport session from boot to process exit: loads persisted
//! credentials, drives (re)connection, persists credential rotations before
//! any later event is processed, and applies the disconnect policy. Exhausting
//! the retry budget is fatal by design; this is the only component allowed to
//! end the process.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    credentials::CredentialStore,
    error::{Error, Result},
    session::{InboundHandler, Transport, TransportEvent, TransportSession},
    types::{ConnectionPhase, ConnectionState, DisconnectReason},
};

/// Reconnect policy knobs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Generic-failure reconnects allowed before giving up.
    pub retry_budget: u32,
    /// Fixed delay between generic reconnect attempts.
    pub retry_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_budget: 5,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// Connection state shared with the operational surface. Synchronous reads
/// only, never held across an await.
#[derive(Clone)]
pub struct SharedConnectionState(Arc<RwLock<ConnectionState>>);

impl SharedConnectionState {
    fn new() -> Self {
        Self(Arc::new(RwLock::new(ConnectionState::Disconnected)))
    }

    fn set(&self, state: ConnectionState) {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        *guard = state;
    }

    pub fn current(&self) -> ConnectionState {
        let guard = self.0.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Pairing code currently awaiting a scan, if any.
    pub fn qr_code(&self) -> Option<String> {
        let guard = self.0.read().unwrap_or_else(|e| e.into_inner());
        guard.qr_code().map(str::to_owned)
    }
}

/// What ended one connection's event stream.
enum Disposition {
    Shutdown,
    Lost(DisconnectReason),
}

pub struct ConnectionSupervisor {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    config: SupervisorConfig,
    state: SharedConnectionState,
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            transport,
            credentials,
            config,
            state: SharedConnectionState::new(),
        }
    }

    /// Handle for reading the connection state from other tasks.
    pub fn state(&self) -> SharedConnectionState {
        self.state.clone()
    }

    /// Run until cancelled or the retry budget is exhausted.
    ///
    /// A fresh budget applies after restart-required and logout disconnects;
    /// generic failures consume it and it is never replenished by a
    /// successful open.
    pub async fn run(
        &self,
        handler: Arc<dyn InboundHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut budget = self.config.retry_budget;

        loop {
            if cancel.is_cancelled() {
                self.state.set(ConnectionState::Disconnected);
                return Ok(());
            }

            let credentials = self.credentials.load().await?;
            if credentials.is_none() {
                info!("no persisted credentials, a pairing scan will be required");
            }

            self.state.set(ConnectionState::Connecting);
            let (session, mut events) = match self.transport.connect(credentials).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, retries_left = budget, "transport connect failed");
                    if !self.consume_budget(&mut budget, &cancel).await {
                        return self.fatal();
                    }
                    continue;
                },
            };

            match self.pump(session, &mut events, &handler, &cancel).await {
                Disposition::Shutdown => {
                    self.state.set(ConnectionState::Disconnected);
                    return Ok(());
                },
                Disposition::Lost(DisconnectReason::RestartRequired) => {
                    info!("restart required, reconnecting immediately");
                    budget = self.config.retry_budget;
                },
                Disposition::Lost(DisconnectReason::LoggedOut) => {
                    warn!("session logged out, wiping credentials, new pairing required");
                    self.credentials.wipe().await?;
                    self.state.set(ConnectionState::LoggedOut);
                    budget = self.config.retry_budget;
                },
                Disposition::Lost(DisconnectReason::Other(code)) => {
                    warn!(
                        status_code = code,
                        retries_left = budget,
                        "connection closed"
                    );
                    self.state.set(ConnectionState::Disconnected);
                    if !self.consume_budget(&mut budget, &cancel).await {
                        return self.fatal();
                    }
                },
            }
        }
    }

    /// Consume one retry and wait out the delay. Returns false when the
    /// budget was already empty.
    async fn consume_budget(&self, budget: &mut u32, cancel: &CancellationToken) -> bool {
        if *budget == 0 {
            return false;
        }
        *budget -= 1;
        tokio::select! {
            () = cancel.cancelled() => {},
            () = tokio::time::sleep(self.config.retry_delay) => {},
        }
        true
    }

    fn fatal(&self) -> Result<()> {
        self.state.set(ConnectionState::Disconnected);
        error!(
            attempts = self.config.retry_budget,
            "connection retries exhausted"
        );
        Err(Error::RetriesExhausted {
            attempts: self.config.retry_budget,
        })
    }

    /// Consume one connection's events until it drops or we shut down.
    async fn pump(
        &self,
        session: Arc<dyn TransportSession>,
        events: &mut mpsc::Receiver<TransportEvent>,
        handler: &Arc<dyn InboundHandler>,
        cancel: &CancellationToken,
    ) -> Disposition {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => return Disposition::Shutdown,
                event = events.recv() => event,
            };

            let Some(event) = event else {
                // Event stream ended without a close frame; treat as a
                // generic loss.
                return Disposition::Lost(DisconnectReason::Other(None));
            };

            match event {
                TransportEvent::Credentials(blob) => {
                    // Persist before touching any later event; a crash here
                    // must not leave acknowledged state un-persisted.
                    if let Err(e) = self.credentials.save(&blob).await {
                        warn!(error = %e, "failed to persist rotated credentials");
                    }
                },
                TransportEvent::Connection(update) => {
                    if let Some(qr) = update.qr {
                        info!("pairing code received, scan via the /qr endpoint");
                        self.state.set(ConnectionState::Pairing { qr });
                        continue;
                    }
                    match update.connection {
                        Some(ConnectionPhase::Open) => {
                            info!("connection opened");
                            self.state.set(ConnectionState::Connected);
                        },
                        Some(ConnectionPhase::Connecting) => {
                            self.state.set(ConnectionState::Connecting);
                        },
                        Some(ConnectionPhase::Close) => {
                            return Disposition::Lost(DisconnectReason::from_status_code(
                                update.status_code,
                            ));
                        },
                        None => {
                            debug!(message = ?update.message, "connection update");
                        },
                    }
                },
                TransportEvent::Batch(batch) => {
                    handler.handle_batch(Arc::clone(&session), batch).await;
                },
                TransportEvent::HistorySync(sync) => {
                    handler.handle_history(sync).await;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use async_trait::async_trait;

    use super::*;
    use crate::types::{ConnectionUpdate, HistorySync, MessageBatch, MessageRef, PresenceState};

    struct NoopSession;

    #[async_trait]
    impl TransportSession for NoopSession {
        async fn send_text(&self, _: &str, _: &str, _: Option<&MessageRef>) -> Result<()> {
            Ok(())
        }
        async fn send_reaction(&self, _: &str, _: &str, _: &MessageRef) -> Result<()> {
            Ok(())
        }
        async fn mark_read(&self, _: &[MessageRef]) -> Result<()> {
            Ok(())
        }
        async fn set_presence(&self, _: &str, _: PresenceState) -> Result<()> {
            Ok(())
        }
    }

    enum Script {
        /// Fail the connect call itself.
        Fail,
        /// Deliver these events, then close the stream.
        Events(Vec<TransportEvent>),
        /// Deliver these events and keep the stream open.
        EventsThenHold(Vec<TransportEvent>),
    }

    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        connects: AtomicU32,
        seen_credentials: Mutex<Vec<Option<serde_json::Value>>>,
        held: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                connects: AtomicU32::new(0),
                seen_credentials: Mutex::new(Vec::new()),
                held: Mutex::new(Vec::new()),
            })
        }

        fn connect_count(&self) -> u32 {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(
            &self,
            credentials: Option<serde_json::Value>,
        ) -> Result<(Arc<dyn TransportSession>, mpsc::Receiver<TransportEvent>)> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.seen_credentials.lock().unwrap().push(credentials);

            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(Script::Fail) => Err(Error::connection_closed("scripted failure")),
                Some(Script::Events(events)) => {
                    let (tx, rx) = mpsc::channel(16);
                    for event in events {
                        tx.send(event).await.map_err(|_| {
                            Error::connection_closed("test receiver dropped early")
                        })?;
                    }
                    Ok((Arc::new(NoopSession), rx))
                },
                Some(Script::EventsThenHold(events)) => {
                    let (tx, rx) = mpsc::channel(16);
                    for event in events {
                        tx.send(event).await.map_err(|_| {
                            Error::connection_closed("test receiver dropped early")
                        })?;
                    }
                    self.held.lock().unwrap().push(tx);
                    Ok((Arc::new(NoopSession), rx))
                },
                None => Err(Error::connection_closed("script exhausted")),
            }
        }
    }

    struct NoopHandler;

    #[async_trait]
    impl InboundHandler for NoopHandler {
        async fn handle_batch(&self, _session: Arc<dyn TransportSession>, _batch: MessageBatch) {}
        async fn handle_history(&self, _sync: HistorySync) {}
    }

    fn close_event(status_code: Option<u16>) -> TransportEvent {
        TransportEvent::Connection(ConnectionUpdate {
            connection: Some(ConnectionPhase::Close),
            qr: None,
            status_code,
            message: None,
        })
    }

    fn open_event() -> TransportEvent {
        TransportEvent::Connection(ConnectionUpdate {
            connection: Some(ConnectionPhase::Open),
            qr: None,
            status_code: None,
            message: None,
        })
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            retry_budget: 2,
            retry_delay: Duration::from_millis(10),
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[tokio::test]
    async fn generic_disconnects_exhaust_budget_and_fail() {
        let transport = ScriptedTransport::new(vec![
            Script::Events(vec![close_event(Some(440))]),
            Script::Events(vec![close_event(Some(440))]),
            Script::Events(vec![close_event(Some(440))]),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));
        let supervisor =
            ConnectionSupervisor::new(Arc::clone(&transport) as _, store, test_config());

        let err = supervisor
            .run(Arc::new(NoopHandler), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 2 }));
        // Initial connect plus the two budgeted retries.
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn restart_required_reconnects_immediately_with_fresh_budget() {
        let transport = ScriptedTransport::new(vec![
            Script::Events(vec![close_event(Some(515))]),
            Script::EventsThenHold(vec![open_event()]),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));
        let config = SupervisorConfig {
            retry_budget: 0,
            retry_delay: Duration::from_millis(10),
        };
        let supervisor = ConnectionSupervisor::new(Arc::clone(&transport) as _, store, config);
        let state = supervisor.state();

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { supervisor.run(Arc::new(NoopHandler), run_cancel).await });

        // Budget is zero, so only the restart-required path can reach the
        // second connect.
        wait_until(|| state.current().is_connected()).await;
        assert_eq!(transport.connect_count(), 2);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn logout_wipes_credentials_and_repairs() {
        let transport = ScriptedTransport::new(vec![
            Script::Events(vec![close_event(Some(401))]),
            Script::EventsThenHold(vec![TransportEvent::Connection(ConnectionUpdate {
                connection: None,
                qr: Some("PAIR-ME".into()),
                status_code: None,
                message: None,
            })]),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));
        store.save(&serde_json::json!({"stale": true})).await.unwrap();

        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&transport) as _,
            store.clone(),
            test_config(),
        );
        let state = supervisor.state();

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { supervisor.run(Arc::new(NoopHandler), run_cancel).await });

        wait_until(|| state.qr_code().is_some()).await;
        assert_eq!(state.qr_code().as_deref(), Some("PAIR-ME"));

        // Stale blob is gone and the second connect started from nothing.
        assert!(store.load().await.unwrap().is_none());
        let seen = transport.seen_credentials.lock().unwrap().clone();
        assert!(seen[0].is_some());
        assert!(seen[1].is_none());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rotated_credentials_persist_before_later_events() {
        let blob = serde_json::json!({"noise_key": "rotated"});
        let transport = ScriptedTransport::new(vec![Script::EventsThenHold(vec![
            TransportEvent::Credentials(blob.clone()),
            open_event(),
        ])]);
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));

        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&transport) as _,
            store.clone(),
            test_config(),
        );
        let state = supervisor.state();

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { supervisor.run(Arc::new(NoopHandler), run_cancel).await });

        // Events are handled in order, so once the open event has been
        // observed the rotation that preceded it must already be durable.
        wait_until(|| state.current().is_connected()).await;
        assert_eq!(store.load().await.unwrap(), Some(blob));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn connect_errors_consume_the_same_budget() {
        let transport = ScriptedTransport::new(vec![Script::Fail, Script::Fail, Script::Fail]);
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));
        let supervisor =
            ConnectionSupervisor::new(Arc::clone(&transport) as _, store, test_config());

        let err = supervisor
            .run(Arc::new(NoopHandler), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 2 }));
        assert_eq!(transport.connect_count(), 3);
    }
}
