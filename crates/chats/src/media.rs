//! Media materialization for inbound messages.
//!
//! The bridge inlines media bytes (base64) in the message payload; papo writes
//! them under a local directory so downstream consumers can reference a file
//! path instead of a blob. Fetch and write failures are recoverable: the
//! message keeps an empty content and processing continues.

use std::{fs, path::PathBuf};

use {async_trait::async_trait, base64::Engine, papo_transport::RawMessage, tracing::debug};

use crate::{
    error::{Error, Result},
    message::MessageKind,
};

/// Source of raw media bytes for a message.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, message: &RawMessage) -> Result<Vec<u8>>;
}

/// Fetcher for bridges that inline media as base64 under the payload's
/// `data` field.
pub struct InlineMediaFetcher;

#[async_trait]
impl MediaFetcher for InlineMediaFetcher {
    async fn fetch(&self, message: &RawMessage) -> Result<Vec<u8>> {
        let kind = MessageKind::classify(message);
        let encoded = kind
            .payload_key()
            .and_then(|key| message.payload.get(key))
            .and_then(|body| body.get("data"))
            .and_then(|data| data.as_str())
            .ok_or_else(|| Error::media("no inline media data in payload"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::media(format!("invalid base64 media data: {e}")))
    }
}

/// Fetcher used when media handling is turned off. Always fails, which the
/// sync path treats as "content stays empty".
pub struct DisabledMediaFetcher;

#[async_trait]
impl MediaFetcher for DisabledMediaFetcher {
    async fn fetch(&self, _message: &RawMessage) -> Result<Vec<u8>> {
        Err(Error::media("media handling disabled"))
    }
}

/// Writes fetched media to `{dir}/{message_id}.{ext}`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Local path a message's media materializes to.
    pub fn path_for(&self, message: &RawMessage, kind: MessageKind) -> PathBuf {
        self.dir
            .join(format!("{}.{}", message.id, kind.media_extension()))
    }

    /// Fetch and persist one message's media. Returns the written path.
    pub async fn materialize(
        &self,
        message: &RawMessage,
        kind: MessageKind,
        fetcher: &dyn MediaFetcher,
    ) -> Result<String> {
        let bytes = fetcher.fetch(message).await?;
        let path = self.path_for(message, kind);

        let write_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = write_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&write_path, &bytes)?;
            Ok(())
        })
        .await??;

        debug!(path = %path.display(), "media materialized");
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_message(id: &str, payload: serde_json::Value) -> RawMessage {
        RawMessage {
            id: id.into(),
            chat_id: "5511999999999@s.whatsapp.net".into(),
            from_me: false,
            push_name: None,
            timestamp: 1714000000,
            payload,
        }
    }

    #[tokio::test]
    async fn inline_fetcher_decodes_payload_data() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"fake jpeg bytes");
        let msg = media_message(
            "IMG1",
            serde_json::json!({"imageMessage": {"mimetype": "image/jpeg", "data": encoded}}),
        );
        let bytes = InlineMediaFetcher.fetch(&msg).await.unwrap();
        assert_eq!(bytes, b"fake jpeg bytes");
    }

    #[tokio::test]
    async fn inline_fetcher_rejects_missing_data() {
        let msg = media_message("IMG2", serde_json::json!({"imageMessage": {}}));
        let err = InlineMediaFetcher.fetch(&msg).await.unwrap_err();
        assert!(matches!(err, Error::Media { .. }));
    }

    #[tokio::test]
    async fn inline_fetcher_rejects_bad_base64() {
        let msg = media_message(
            "IMG3",
            serde_json::json!({"imageMessage": {"data": "!!! not base64 !!!"}}),
        );
        let err = InlineMediaFetcher.fetch(&msg).await.unwrap_err();
        assert!(matches!(err, Error::Media { .. }));
    }

    #[tokio::test]
    async fn materialize_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let encoded = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4");
        let msg = media_message(
            "DOC1",
            serde_json::json!({"documentMessage": {"data": encoded}}),
        );

        let path = store
            .materialize(&msg, MessageKind::Document, &InlineMediaFetcher)
            .await
            .unwrap();

        assert!(path.ends_with("DOC1.pdf"));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn materialize_surfaces_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let msg = media_message("IMG4", serde_json::json!({"imageMessage": {}}));

        let err = store
            .materialize(&msg, MessageKind::Image, &DisabledMediaFetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Media { .. }));
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
