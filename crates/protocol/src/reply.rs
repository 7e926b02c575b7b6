//! The strict reply grammar and its parser.
//!
//! The backend is instructed to answer in exactly two lines:
//!
//! ```text
//! - type: {text|reaction}
//! - response: {payload}
//! ```
//!
//! Anything that does not match parses to [`ParsedReply::Fallback`], which is
//! an expected branch of the protocol (it resolves to the apology reply), not
//! an error.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::RenderedContext;

static REPLY_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"- type:\s*(\w+)\s*- response:\s*([\s\S]*)").expect("reply grammar regex is valid")
});

/// Glyph substituted for reaction names the backend invents.
pub const DEFAULT_REACTION: &str = "\u{1F914}"; // 🤔

/// Symbolic reaction names the backend may answer with, each mapped to the
/// transport-native glyph.
const REACTIONS: &[(&str, &str)] = &[
    ("like", "\u{1F44D}"),               // 👍
    ("thinking", "\u{1F914}"),           // 🤔
    ("cool", "\u{1F60E}"),               // 😎
    ("check", "\u{2714}\u{FE0F}"),       // ✔️
    ("eyes", "\u{1F440}"),               // 👀
    ("thanks", "\u{1F64F}"),             // 🙏
    ("smile", "\u{1F60A}"),              // 😊
    ("love", "\u{2764}\u{FE0F}"),        // ❤️
    ("clap", "\u{1F44F}"),               // 👏
    ("fire", "\u{1F525}"),               // 🔥
    ("rocket", "\u{1F680}"),             // 🚀
    ("star", "\u{2B50}"),                // ⭐
    ("trophy", "\u{1F3C6}"),             // 🏆
    ("wave", "\u{1F44B}"),               // 👋
    ("party", "\u{1F389}"),              // 🎉
    ("thumbsdown", "\u{1F44E}"),         // 👎
    ("cry", "\u{1F622}"),                // 😢
    ("laugh", "\u{1F602}"),              // 😂
    ("wink", "\u{1F609}"),               // 😉
    ("sleep", "\u{1F634}"),              // 😴
    ("angry", "\u{1F620}"),              // 😠
    ("surprise", "\u{1F632}"),           // 😲
    ("sweat", "\u{1F605}"),              // 😅
    ("music", "\u{1F3B5}"),              // 🎵
    ("cake", "\u{1F382}"),               // 🎂
    ("coffee", "\u{2615}"),              // ☕
    ("sun", "\u{2600}\u{FE0F}"),         // ☀️
    ("moon", "\u{1F319}"),               // 🌙
    ("rain", "\u{1F327}\u{FE0F}"),       // 🌧️
    ("snow", "\u{2744}\u{FE0F}"),        // ❄️
    ("starstruck", "\u{1F929}"),         // 🤩
    ("hug", "\u{1F917}"),                // 🤗
    ("facepalm", "\u{1F926}"),           // 🤦
    ("shrug", "\u{1F937}"),              // 🤷
    ("dizzy", "\u{1F4AB}"),              // 💫
    ("sick", "\u{1F922}"),               // 🤢
    ("nerd", "\u{1F913}"),               // 🤓
    ("robot", "\u{1F916}"),              // 🤖
    ("unicorn", "\u{1F984}"),            // 🦄
    ("palm_tree", "\u{1F334}"),          // 🌴
];

/// Resolve a symbolic reaction name (with or without the surrounding colons)
/// to its glyph.
pub fn reaction_glyph(name: &str) -> Option<&'static str> {
    let name = name.trim().trim_matches(':');
    REACTIONS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, glyph)| *glyph)
}

/// Outcome of parsing one backend reply. Total over all inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Text(String),
    /// Symbolic reaction name as the backend wrote it, e.g. `:like:`.
    Reaction(String),
    /// Matched the grammar with a type token the protocol does not know.
    Other { kind: String, response: String },
    /// The reply did not match the grammar at all.
    Fallback,
}

impl ParsedReply {
    /// Map the parse outcome to the transport-level action owed for the
    /// round. Unknown reaction names degrade to [`DEFAULT_REACTION`]; every
    /// non-conforming branch resolves to the apology.
    pub fn action(self) -> ReplyAction {
        match self {
            Self::Text(text) => ReplyAction::Text(text),
            Self::Reaction(name) => {
                ReplyAction::Reaction(reaction_glyph(&name).unwrap_or(DEFAULT_REACTION))
            },
            Self::Other { .. } | Self::Fallback => ReplyAction::Apology,
        }
    }
}

/// Transport-level action a reply round resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    Text(String),
    Reaction(&'static str),
    Apology,
}

/// The instruction half of the contract: builds the full prompt and parses
/// what comes back.
#[derive(Debug, Clone)]
pub struct ReplyContract {
    /// Language the backend is told to write text replies in.
    pub language: String,
}

impl Default for ReplyContract {
    fn default() -> Self {
        Self {
            language: "Portuguese".into(),
        }
    }
}

impl ReplyContract {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Rendered context plus the fixed instruction block.
    pub fn prompt_for(&self, context: &RenderedContext) -> String {
        let names = REACTIONS
            .iter()
            .map(|(name, _)| format!(":{name}:"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{context}\n\
             Answer the messages awaiting a reply. Respond with exactly two lines,\n\
             in this format and nothing else:\n\
             - type: {{text|reaction}}\n\
             - response: {{payload}}\n\
             \n\
             For type \"text\", the response is the message to send, written in {language}.\n\
             Example:\n\
             - type: text\n\
             - response: Oi! Tudo bem sim, e com você?\n\
             \n\
             For type \"reaction\", the response must be exactly one of:\n\
             {names}\n\
             Example:\n\
             - type: reaction\n\
             - response: :like:\n",
            context = context.prompt,
            language = self.language,
        )
    }

    /// Parse a raw backend reply. Never errors: a malformed or absent reply
    /// is the `Fallback` branch.
    pub fn parse(&self, raw: &str) -> ParsedReply {
        let Some(captures) = REPLY_GRAMMAR.captures(raw) else {
            return ParsedReply::Fallback;
        };
        let kind = captures[1].trim();
        let response = captures[2].trim().to_owned();
        match kind {
            "text" => ParsedReply::Text(response),
            "reaction" => ParsedReply::Reaction(response),
            other => ParsedReply::Other {
                kind: other.to_owned(),
                response,
            },
        }
    }
}
