use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use uuid::Uuid;

use crate::api::ConversationSummary;

/// Internal application events delivered back to the TUI loop
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The chat call for a placeholder finished
    ChatSettled {
        placeholder_id: Uuid,
        outcome: ChatOutcome,
    },

    /// The server reported an intent for a still-pending reply
    PlaceholderRelabel {
        placeholder_id: Uuid,
        label: PlaceholderLabel,
    },

    /// Conversation list fetched (or failed)
    HistoryLoaded(Result<Vec<ConversationSummary>, String>),

    /// A single conversation fetched (or failed)
    ConversationLoaded {
        id: String,
        result: Result<Vec<ConversationEntry>, String>,
    },

    /// A new server-side conversation was created (or failed)
    ConversationCreated(Result<Option<String>, String>),
}

/// Terminal result of one send, as seen by the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// Structurally successful reply; `None` when the server sent no text
    Reply(Option<String>),
    /// The endpoint answered with an `error` field
    ApiError(String),
    /// Network failure, bad status or undecodable body
    Transport(String),
}

/// Role in conversation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
    System,
}

/// Individual conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub role: ConversationRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub loading: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(role: ConversationRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            loading: false,
            created_at: Utc::now(),
        }
    }

    /// Provisional assistant entry shown while a reply is pending
    pub fn placeholder(label: PlaceholderLabel) -> Self {
        Self {
            loading: true,
            ..Self::new(ConversationRole::Assistant, label.text())
        }
    }
}

/// Models the chat endpoint accepts
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
pub enum ChatModel {
    #[default]
    #[serde(rename = "gpt-4o")]
    #[strum(serialize = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    #[strum(serialize = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "o1-mini")]
    #[strum(serialize = "o1-mini")]
    O1Mini,
    #[serde(rename = "o1-preview")]
    #[strum(serialize = "o1-preview")]
    O1Preview,
}

impl ChatModel {
    /// Identifier sent over the wire
    pub fn id(self) -> &'static str {
        self.into()
    }

    /// Next model in the fixed list, wrapping around
    pub fn next(self) -> ChatModel {
        let all: Vec<ChatModel> = ChatModel::iter().collect();
        let pos = all.iter().position(|m| *m == self).unwrap_or(0);
        all[(pos + 1) % all.len()]
    }

    /// Previous model in the fixed list, wrapping around
    pub fn prev(self) -> ChatModel {
        let all: Vec<ChatModel> = ChatModel::iter().collect();
        let pos = all.iter().position(|m| *m == self).unwrap_or(0);
        all[(pos + all.len() - 1) % all.len()]
    }
}

/// Label carried by a loading placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderLabel {
    Typing,
    Searching,
    CreatingImage,
    WritingCode,
}

impl PlaceholderLabel {
    pub fn text(self) -> &'static str {
        match self {
            PlaceholderLabel::Typing => "Typing...",
            PlaceholderLabel::Searching => "Searching the web...",
            PlaceholderLabel::CreatingImage => "Creating image...",
            PlaceholderLabel::WritingCode => "Writing code...",
        }
    }

    /// Keyword guess from the draft text. Only a presentation hint.
    pub fn guess(message: &str) -> PlaceholderLabel {
        let lower = message.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has_any(&["image", "picture", "draw", "generate a photo", "illustration"]) {
            PlaceholderLabel::CreatingImage
        } else if has_any(&["search", "look up", "latest", "news", "today"]) {
            PlaceholderLabel::Searching
        } else if has_any(&["code", "function", "script", "program", "bug"]) {
            PlaceholderLabel::WritingCode
        } else {
            PlaceholderLabel::Typing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn model_ids_match_wire_names() {
        assert_eq!(ChatModel::Gpt4o.id(), "gpt-4o");
        assert_eq!(ChatModel::from_str("o1-preview").unwrap(), ChatModel::O1Preview);
        assert_eq!(
            serde_json::to_string(&ChatModel::Gpt4oMini).unwrap(),
            "\"gpt-4o-mini\""
        );
    }

    #[test]
    fn model_cycling_wraps() {
        assert_eq!(ChatModel::O1Preview.next(), ChatModel::Gpt4o);
        assert_eq!(ChatModel::Gpt4o.prev(), ChatModel::O1Preview);
    }

    #[test]
    fn server_entries_get_fresh_ids_and_settled_state() {
        let entry: ConversationEntry =
            serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(entry.role, ConversationRole::Assistant);
        assert!(!entry.loading);
        assert!(!entry.id.is_nil());
    }

    #[test]
    fn guesses_placeholder_from_keywords() {
        assert_eq!(PlaceholderLabel::guess("Draw a cat picture"), PlaceholderLabel::CreatingImage);
        assert_eq!(PlaceholderLabel::guess("search the latest news"), PlaceholderLabel::Searching);
        assert_eq!(PlaceholderLabel::guess("Hello"), PlaceholderLabel::Typing);
    }
}
