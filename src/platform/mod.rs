pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::Notification;
use crate::origin::{Entity, OriginRef};
use crate::reconciler::MessageKey;

/// A text post observed in one of the source chats.
#[derive(Debug, Clone)]
pub struct IncomingPost {
    pub chat_id: i64,
    pub message_id: i32,
    /// Human-readable name of the source chat
    pub chat_name: String,
    /// Message text, or the caption for media posts
    pub text: String,
    pub forward_origin: Option<OriginRef>,
}

impl IncomingPost {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.chat_id, self.message_id)
    }
}

/// Display name for a chat: its title, else `@username`, else its id.
pub fn chat_display_name(title: Option<&str>, username: Option<&str>, id: i64) -> String {
    match (title.filter(|t| !t.trim().is_empty()), username) {
        (Some(title), _) => title.to_string(),
        (None, Some(username)) if !username.is_empty() => format!("@{}", username),
        _ => format!("Channel ID {}", id),
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("recipient cannot be resolved")]
    NotResolvable,
    #[error("recipient identifier is invalid")]
    InvalidRecipient,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("entity not found")]
    NotFound,
    #[error("access to entity denied")]
    Forbidden,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound delivery of a notification to one recipient.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: i64, notification: &Notification) -> Result<(), SendError>;
}

/// Lookup of users and chats by identifier.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn lookup(&self, id: i64) -> Result<Entity, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_display_name_prefers_title() {
        assert_eq!(chat_display_name(Some("Gold Room"), Some("gold"), 1), "Gold Room");
    }

    #[test]
    fn test_chat_display_name_falls_back() {
        assert_eq!(chat_display_name(None, Some("gold"), 1), "@gold");
        assert_eq!(chat_display_name(Some("  "), None, -1001), "Channel ID -1001");
        assert_eq!(chat_display_name(None, Some(""), 5), "Channel ID 5");
    }
}
