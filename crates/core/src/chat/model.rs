//! Chat model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters of the first message used as a chat name
pub const CHAT_NAME_MAX_CHARS: usize = 36;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Human,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(chat_id: Uuid, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            sender,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Settings stored with a single chat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub agent_id: Option<Uuid>,
}

/// Settings shared by all chats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// A conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    /// Messages in creation order
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub settings: ChatSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Create an empty chat with the given name
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            messages: Vec::new(),
            settings: ChatSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the chat settings
    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Derive a chat name from its first message
    pub fn name_from_message(message: &str) -> String {
        let mut chars = message.chars();
        let head: String = chars.by_ref().take(CHAT_NAME_MAX_CHARS).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }

    /// Ordered `(sender, content)` pairs of the conversation so far
    pub fn history(&self) -> Vec<(Sender, String)> {
        self.messages
            .iter()
            .map(|m| (m.sender, m.content.clone()))
            .collect()
    }

    pub fn message(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }
}

/// Last message shown in a chat listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub sender: Sender,
}

/// Chat listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: Uuid,
    pub name: String,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id,
            name: chat.name.clone(),
            last_message: chat.messages.last().map(|m| LastMessage {
                content: m.content.clone(),
                sender: m.sender,
            }),
            created_at: chat.created_at,
        }
    }
}
