//! Message kind classification and content extraction.

use papo_transport::RawMessage;

/// Semantic kind of an inbound message, derived from the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Conversation,
    ExtendedText,
    Image,
    Video,
    Audio,
    Document,
    Location,
    Contact,
    Reaction,
    Unknown,
}

impl MessageKind {
    /// Classify a raw message by the recognized key in its payload.
    ///
    /// Total over the input domain: unrecognized or empty payloads map to
    /// `Unknown` rather than erroring.
    pub fn classify(message: &RawMessage) -> Self {
        let Some(object) = message.payload.as_object() else {
            return Self::Unknown;
        };
        object
            .keys()
            .find_map(|key| Self::from_payload_key(key))
            .unwrap_or(Self::Unknown)
    }

    fn from_payload_key(key: &str) -> Option<Self> {
        match key {
            "conversation" => Some(Self::Conversation),
            "extendedTextMessage" => Some(Self::ExtendedText),
            "imageMessage" => Some(Self::Image),
            "videoMessage" => Some(Self::Video),
            "audioMessage" => Some(Self::Audio),
            "documentMessage" => Some(Self::Document),
            "locationMessage" => Some(Self::Location),
            "contactMessage" => Some(Self::Contact),
            "reactionMessage" => Some(Self::Reaction),
            _ => None,
        }
    }

    pub(crate) fn payload_key(self) -> Option<&'static str> {
        match self {
            Self::Conversation => Some("conversation"),
            Self::ExtendedText => Some("extendedTextMessage"),
            Self::Image => Some("imageMessage"),
            Self::Video => Some("videoMessage"),
            Self::Audio => Some("audioMessage"),
            Self::Document => Some("documentMessage"),
            Self::Location => Some("locationMessage"),
            Self::Contact => Some("contactMessage"),
            Self::Reaction => Some("reactionMessage"),
            Self::Unknown => None,
        }
    }

    /// Kinds a reply can be owed for: plain text, quoted text, reactions.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Conversation | Self::ExtendedText | Self::Reaction)
    }

    /// Kinds whose content is a downloaded media file.
    pub fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio | Self::Document)
    }

    /// File extension used when materializing media locally.
    pub(crate) fn media_extension(self) -> &'static str {
        match self {
            Self::Image => "jpeg",
            Self::Video => "mp4",
            Self::Audio => "mp3",
            Self::Document => "pdf",
            _ => "bin",
        }
    }
}

/// Extract the textual content for text-like kinds. Media content is
/// materialized separately; other kinds have no textual content.
pub(crate) fn extract_text(kind: MessageKind, message: &RawMessage) -> Option<String> {
    let key = kind.payload_key()?;
    let body = message.payload.get(key)?;
    match kind {
        MessageKind::Conversation => body.as_str().map(str::to_owned),
        MessageKind::ExtendedText | MessageKind::Reaction => {
            body.get("text").and_then(|t| t.as_str()).map(str::to_owned)
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(payload: serde_json::Value) -> RawMessage {
        RawMessage {
            id: "MSG1".into(),
            chat_id: "5511999999999@s.whatsapp.net".into(),
            from_me: false,
            push_name: Some("Ana".into()),
            timestamp: 1714000000,
            payload,
        }
    }

    #[test]
    fn classifies_all_known_payload_keys() {
        let cases = [
            (serde_json::json!({"conversation": "oi"}), MessageKind::Conversation),
            (
                serde_json::json!({"extendedTextMessage": {"text": "oi"}}),
                MessageKind::ExtendedText,
            ),
            (serde_json::json!({"imageMessage": {}}), MessageKind::Image),
            (serde_json::json!({"videoMessage": {}}), MessageKind::Video),
            (serde_json::json!({"audioMessage": {}}), MessageKind::Audio),
            (serde_json::json!({"documentMessage": {}}), MessageKind::Document),
            (serde_json::json!({"locationMessage": {}}), MessageKind::Location),
            (serde_json::json!({"contactMessage": {}}), MessageKind::Contact),
            (
                serde_json::json!({"reactionMessage": {"text": "\u{1F44D}"}}),
                MessageKind::Reaction,
            ),
        ];
        for (payload, expected) in cases {
            assert_eq!(MessageKind::classify(&raw(payload)), expected);
        }
    }

    #[test]
    fn unrecognized_payloads_classify_as_unknown() {
        assert_eq!(
            MessageKind::classify(&raw(serde_json::json!({"pollCreationMessage": {}}))),
            MessageKind::Unknown
        );
        assert_eq!(
            MessageKind::classify(&raw(serde_json::json!({}))),
            MessageKind::Unknown
        );
        assert_eq!(
            MessageKind::classify(&raw(serde_json::Value::Null)),
            MessageKind::Unknown
        );
    }

    #[test]
    fn ignores_metadata_keys_next_to_the_recognized_one() {
        let payload = serde_json::json!({
            "messageContextInfo": {"deviceListMetadata": {}},
            "conversation": "oi",
        });
        assert_eq!(MessageKind::classify(&raw(payload)), MessageKind::Conversation);
    }

    #[test]
    fn extracts_text_per_kind() {
        let msg = raw(serde_json::json!({"conversation": "bom dia"}));
        assert_eq!(
            extract_text(MessageKind::Conversation, &msg).as_deref(),
            Some("bom dia")
        );

        let msg = raw(serde_json::json!({"extendedTextMessage": {"text": "olha isso"}}));
        assert_eq!(
            extract_text(MessageKind::ExtendedText, &msg).as_deref(),
            Some("olha isso")
        );

        let msg = raw(serde_json::json!({"reactionMessage": {"text": "\u{2764}\u{FE0F}"}}));
        assert_eq!(
            extract_text(MessageKind::Reaction, &msg).as_deref(),
            Some("\u{2764}\u{FE0F}")
        );

        let msg = raw(serde_json::json!({"imageMessage": {}}));
        assert_eq!(extract_text(MessageKind::Image, &msg), None);
    }

    #[test]
    fn supported_set_is_text_like_plus_reaction() {
        assert!(MessageKind::Conversation.is_supported());
        assert!(MessageKind::ExtendedText.is_supported());
        assert!(MessageKind::Reaction.is_supported());
        assert!(!MessageKind::Image.is_supported());
        assert!(!MessageKind::Location.is_supported());
        assert!(!MessageKind::Unknown.is_supported());
    }

    #[test]
    fn media_extensions() {
        assert_eq!(MessageKind::Image.media_extension(), "jpeg");
        assert_eq!(MessageKind::Video.media_extension(), "mp4");
        assert_eq!(MessageKind::Audio.media_extension(), "mp3");
        assert_eq!(MessageKind::Document.media_extension(), "pdf");
    }
}
