use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("bridge connection closed: {message}")]
    ConnectionClosed { message: String },

    #[error("send not acknowledged: {message}")]
    SendFailed { message: String },

    #[error("connection retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl Error {
    #[must_use]
    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
