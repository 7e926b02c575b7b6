use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("media unavailable: {message}")]
    Media { message: String },
}

impl Error {
    #[must_use]
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
