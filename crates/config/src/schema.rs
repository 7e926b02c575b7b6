//! Config schema. Every section has serde defaults so a missing or partial
//! file degrades to a runnable configuration.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PapoConfig {
    pub server: ServerConfig,
    pub transport: TransportConfig,
    pub chats: ChatsConfig,
    pub reasoning: ReasoningConfig,
    pub reply: ReplyConfig,
    pub archive: ArchiveConfig,
}

/// Operational HTTP surface (`/health`, `/qr`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3600,
        }
    }
}

/// Bridge connection and reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket URL of the bridge process that owns the messaging session.
    pub bridge_url: String,
    /// Where the session credential blob is persisted. Defaults to
    /// `credentials.json` under the user config dir.
    pub credentials_path: Option<std::path::PathBuf>,
    /// Generic-failure reconnects allowed before the process gives up.
    pub retry_budget: u32,
    /// Fixed delay between generic reconnect attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bridge_url: "ws://127.0.0.1:3601".into(),
            credentials_path: None,
            retry_budget: 5,
            retry_delay_secs: 10,
        }
    }
}

/// Chat registry and context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatsConfig {
    /// Messages included in the prompt window.
    pub context_window: usize,
    /// Chats kept in memory before LRU eviction.
    pub capacity: usize,
    /// Directory media files are materialized into. Media handling is off
    /// when unset.
    pub media_dir: Option<std::path::PathBuf>,
}

impl Default for ChatsConfig {
    fn default() -> Self {
        Self {
            context_window: 15,
            capacity: 1024,
            media_dir: None,
        }
    }
}

/// Remote reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub base_url: String,
    /// Bearer token. Usually supplied as `${PAPO_REASONING_API_KEY}`.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    pub flow_id: String,
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7860".into(),
            api_key: None,
            flow_id: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Reply texture: language and the fixed apology.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    pub language: String,
    pub apology: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            language: "Portuguese".into(),
            apology: "Desculpe, houve um erro ao processar sua resposta.".into(),
        }
    }
}

/// Document archive. Disabled when no database path is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub database_path: Option<std::path::PathBuf>,
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
