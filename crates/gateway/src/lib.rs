//! Runtime wiring: config in, running service out.
//!
//! Builds the chat store, reasoning client, orchestrator, and connection
//! supervisor from a [`PapoConfig`], then runs the supervisor loop and the
//! operational HTTP surface side by side. A supervisor failure (retry budget
//! exhausted) tears the whole runtime down with an error; the binary turns
//! that into a non-zero exit.

pub mod server;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    papo_archive::SqliteArchive,
    papo_chats::{ChatStore, InlineMediaFetcher, MediaStore},
    papo_config::PapoConfig,
    papo_orchestrator::ChatOrchestrator,
    papo_protocol::{ContextBuilder, ReplyContract},
    papo_reasoning::ReasoningClient,
    papo_transport::{BridgeTransport, ConnectionSupervisor, CredentialStore, SupervisorConfig},
    tokio_util::sync::CancellationToken,
    tracing::info,
};

pub use server::{AppState, build_app};

/// Run papo until cancelled or the connection supervisor gives up.
pub async fn run(config: PapoConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let mut store = ChatStore::new(config.chats.capacity);
    if let Some(media_dir) = &config.chats.media_dir {
        store = store.with_media(MediaStore::new(media_dir), Arc::new(InlineMediaFetcher));
    }

    let reasoning = ReasoningClient::new(papo_reasoning::ReasoningConfig {
        base_url: config.reasoning.base_url.clone(),
        api_key: config.reasoning.api_key.clone(),
        flow_id: config.reasoning.flow_id.clone(),
        timeout: Duration::from_secs(config.reasoning.timeout_secs),
    })?;

    let mut orchestrator = ChatOrchestrator::new(
        Arc::new(store),
        ContextBuilder::new(config.chats.context_window),
        ReplyContract::new(config.reply.language.clone()),
        Arc::new(reasoning),
    )
    .with_apology(config.reply.apology.clone());

    if let Some(path) = &config.archive.database_path {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = sqlx::SqlitePool::connect(&url).await?;
        SqliteArchive::init(&pool).await?;
        orchestrator = orchestrator.with_archive(Arc::new(SqliteArchive::new(pool)));
        info!(path = %path.display(), "archive enabled");
    }

    let credentials_path = config
        .transport
        .credentials_path
        .clone()
        .unwrap_or_else(papo_config::default_credentials_path);
    let supervisor = ConnectionSupervisor::new(
        Arc::new(BridgeTransport::new(config.transport.bridge_url.clone())),
        CredentialStore::new(credentials_path),
        SupervisorConfig {
            retry_budget: config.transport.retry_budget,
            retry_delay: Duration::from_secs(config.transport.retry_delay_secs),
        },
    );

    let app = build_app(AppState {
        connection: supervisor.state(),
    });
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, bridge = %config.transport.bridge_url, "papo gateway listening");

    let server_cancel = cancel.clone();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    };

    let handler = Arc::new(orchestrator);
    tokio::select! {
        result = supervisor.run(handler, cancel.clone()) => {
            result?;
            Ok(())
        },
        result = server => {
            result?;
            Ok(())
        },
    }
}
