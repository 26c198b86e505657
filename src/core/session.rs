use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ChatMessage;
use crate::core::message::Message;

pub type SessionId = Uuid;

/// Profile name and system prompt captured when a session begins.
///
/// Never updated afterwards, even if the source profile is edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    profile_name: String,
    system_prompt_text: String,
}

impl ProfileSnapshot {
    pub fn new(profile_name: impl Into<String>, system_prompt_text: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            system_prompt_text: system_prompt_text.into(),
        }
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt_text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_activity_at: DateTime<Utc>,
    pub(crate) profile_snapshot: ProfileSnapshot,
    #[serde(default)]
    pub(crate) messages: Vec<Message>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) title_generated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(profile_snapshot: ProfileSnapshot) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_activity_at: now,
            profile_snapshot,
            messages: Vec::new(),
            title: None,
            title_generated_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn profile(&self) -> &ProfileSnapshot {
        &self.profile_snapshot
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn title_generated_at(&self) -> Option<DateTime<Utc>> {
        self.title_generated_at
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        // Clock skew must not move activity before creation.
        self.last_activity_at = now.max(self.created_at);
    }

    /// Set the title once. Returns `false` if a title already exists.
    pub(crate) fn assign_title(&mut self, title: String, at: DateTime<Utc>) -> bool {
        if self.title.is_some() {
            return false;
        }
        self.title = Some(title);
        self.title_generated_at = Some(at);
        true
    }

    pub fn assistant_reply_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_assistant()).count()
    }

    pub fn has_assistant_reply(&self) -> bool {
        self.messages.iter().any(Message::is_assistant)
    }

    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_user())
    }

    pub fn first_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_assistant())
    }

    /// The last message that would be sent upstream.
    pub fn last_eligible_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| !m.is_error())
    }

    /// Transcript in wire form with error entries dropped.
    pub fn api_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter_map(Message::to_api_message)
            .collect()
    }

    /// Title for listings: the assigned title or a placeholder.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("New Chat")
    }
}
