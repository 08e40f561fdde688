//! Chat repository trait
//!
//! Defines the interface for chat and message storage operations.

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{Chat, ChatMessage, ChatSummary, GlobalSettings, Sender};
use crate::Result;

/// Repository interface for chats and their messages
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Create a new chat
    async fn create_chat(&self, chat: Chat) -> Result<Chat>;

    /// Get a chat with its messages by ID
    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>>;

    /// List chat summaries, newest first
    async fn list_chats(&self) -> Result<Vec<ChatSummary>>;

    /// Delete a chat and its messages
    async fn delete_chat(&self, id: Uuid) -> Result<bool>;

    /// Append a message to a chat
    async fn add_message(
        &self,
        chat_id: Uuid,
        sender: Sender,
        content: String,
    ) -> Result<ChatMessage>;

    /// Replace the content of a message
    async fn update_message(&self, message_id: Uuid, content: String) -> Result<bool>;

    /// Delete a message
    async fn delete_message(&self, message_id: Uuid) -> Result<bool>;

    /// Get the global settings
    async fn global_settings(&self) -> Result<GlobalSettings>;

    /// Replace the global settings
    async fn update_global_settings(&self, settings: GlobalSettings) -> Result<GlobalSettings>;
}
