//! Client for the remote reasoning service.
//!
//! One HTTP POST per reply round. Every failure here is typed and recovered
//! by the orchestrator into the apology path; nothing in this crate is
//! allowed to crash a reply round.

pub mod client;

use {async_trait::async_trait, thiserror::Error};

pub use client::{ReasoningClient, ReasoningConfig};

#[derive(Debug, Error)]
pub enum Error {
    #[error("reasoning request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("reasoning service returned status {status}")]
    Status { status: u16 },

    #[error("malformed reasoning response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("reasoning response is missing the reply text")]
    MissingReply,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The seam the orchestrator calls through, so reply handling is testable
/// without HTTP.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Turn a rendered prompt into the backend's raw structured reply.
    async fn reply(&self, prompt: &str) -> Result<String>;
}
