use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ChatMessage;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_ERROR: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Client-authored failure notice. Shown in the transcript, never sent.
    Error,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => ROLE_SYSTEM,
            MessageRole::User => ROLE_USER,
            MessageRole::Assistant => ROLE_ASSISTANT,
            MessageRole::Error => ROLE_ERROR,
        }
    }

    pub fn to_api_role(self) -> Option<&'static str> {
        match self {
            MessageRole::Error => None,
            other => Some(other.as_str()),
        }
    }
}

impl AsRef<str> for MessageRole {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for MessageRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            ROLE_SYSTEM => Ok(MessageRole::System),
            ROLE_USER => Ok(MessageRole::User),
            ROLE_ASSISTANT => Ok(MessageRole::Assistant),
            ROLE_ERROR => Ok(MessageRole::Error),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        Self::try_from(value.as_str())
    }
}

impl From<MessageRole> for String {
    fn from(value: MessageRole) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Error, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn is_error(&self) -> bool {
        self.role == MessageRole::Error
    }

    /// Wire form of this message, or `None` for roles never sent upstream.
    pub fn to_api_message(&self) -> Option<ChatMessage> {
        self.role
            .to_api_role()
            .map(|role| ChatMessage::new(role, self.content.clone()))
    }
}
