//! Configuration loading and env substitution.
//!
//! Config files: `papo.toml`, `papo.yaml`, or `papo.json`,
//! searched in `./` then `~/.config/papo/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, default_credentials_path, discover_and_load, load_config},
    schema::{
        ArchiveConfig, ChatsConfig, PapoConfig, ReasoningConfig, ReplyConfig, ServerConfig,
        TransportConfig,
    },
};
