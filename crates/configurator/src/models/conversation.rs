//! Conversation messages exchanged between the widget and the chat API.
//!
//! The client keeps the whole history and sends it with every turn; the
//! server never stores it.

use serde::{Deserialize, Serialize};

pub use crate::claude::Role;

/// One message of a chat, as held by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Client-assigned id (e.g. `"welcome"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

/// A piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// Markdown text.
    Text { text: String },
    /// A tool call made by the assistant, with its outcome.
    ToolInvocation {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
        /// Set when the call succeeded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
        /// Set when the call failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_text: Option<String>,
    },
}

impl ConversationMessage {
    /// A user message with a single text part.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            role: Role::User,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// An assistant message with a single text part.
    #[must_use]
    pub fn assistant_text(id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// All text parts joined together.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::ToolInvocation { .. } => None,
            })
            .collect()
    }
}
