use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn of a conversation supplied by the caller. The full history travels
/// with every request; nothing is kept server side.
#[derive(Deserialize, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "User"),
            MessageRole::Assistant => write!(f, "Assistant"),
        }
    }
}

impl fmt::Display for ConversationTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

// helper function to format a conversation for logs
pub fn format_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{turn}"))
        .collect::<Vec<String>>()
        .join("\n")
}
