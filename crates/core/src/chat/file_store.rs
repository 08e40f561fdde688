//! File-based chat storage implementation
//!
//! Stores chats and global settings as a single JSON document on disk.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{Chat, ChatMessage, ChatSummary, GlobalSettings, Sender};
use super::repository::ChatRepository;
use crate::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatDocument {
    #[serde(default)]
    chats: Vec<Chat>,
    #[serde(default)]
    global_settings: GlobalSettings,
}

#[derive(Default, Clone)]
struct ChatCache {
    chats: HashMap<Uuid, Chat>,
    global_settings: GlobalSettings,
}

/// File-based chat store using JSON
///
/// Writes go to a copy of the cache which replaces the cache only after the
/// document is on disk, so a failed write leaves no trace in memory either.
pub struct FileChatStore {
    /// Path to the JSON file
    path: PathBuf,
    /// In-memory cache of the document
    cache: RwLock<ChatCache>,
}

impl FileChatStore {
    /// Create a new FileChatStore
    ///
    /// If the file doesn't exist, it will be created on first write.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let document: ChatDocument = serde_json::from_str(&content)?;
            debug!(path = %path.display(), chats = document.chats.len(), "Loaded chat store");
            ChatCache {
                chats: document.chats.into_iter().map(|c| (c.id, c)).collect(),
                global_settings: document.global_settings,
            }
        } else {
            ChatCache::default()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// Write `cache` to disk
    async fn persist(&self, cache: &ChatCache) -> Result<()> {
        let document = ChatDocument {
            chats: cache.chats.values().cloned().collect(),
            global_settings: cache.global_settings.clone(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

fn find_message_mut(chats: &mut HashMap<Uuid, Chat>, message_id: Uuid) -> Option<&mut Chat> {
    chats
        .values_mut()
        .find(|chat| chat.messages.iter().any(|m| m.id == message_id))
}

#[async_trait]
impl ChatRepository for FileChatStore {
    async fn create_chat(&self, chat: Chat) -> Result<Chat> {
        let mut cache = self.cache.write().await;
        if cache.chats.contains_key(&chat.id) {
            return Err(Error::InvalidInput(format!(
                "Chat with ID {} already exists",
                chat.id
            )));
        }

        let mut next = cache.clone();
        next.chats.insert(chat.id, chat.clone());
        self.persist(&next).await?;
        *cache = next;
        Ok(chat)
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        let cache = self.cache.read().await;
        Ok(cache.chats.get(&id).cloned())
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let cache = self.cache.read().await;
        let mut chats: Vec<&Chat> = cache.chats.values().collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats.into_iter().map(ChatSummary::from).collect())
    }

    async fn delete_chat(&self, id: Uuid) -> Result<bool> {
        let mut cache = self.cache.write().await;
        if !cache.chats.contains_key(&id) {
            return Ok(false);
        }

        let mut next = cache.clone();
        next.chats.remove(&id);
        self.persist(&next).await?;
        *cache = next;
        info!(chat_id = %id, "Chat deleted");
        Ok(true)
    }

    async fn add_message(
        &self,
        chat_id: Uuid,
        sender: Sender,
        content: String,
    ) -> Result<ChatMessage> {
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        let chat = next
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::ChatNotFound(chat_id.to_string()))?;
        let message = ChatMessage::new(chat_id, sender, content);
        chat.messages.push(message.clone());
        chat.updated_at = Utc::now();

        self.persist(&next).await?;
        *cache = next;
        Ok(message)
    }

    async fn update_message(&self, message_id: Uuid, content: String) -> Result<bool> {
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        let Some(chat) = find_message_mut(&mut next.chats, message_id) else {
            return Ok(false);
        };
        if let Some(message) = chat.messages.iter_mut().find(|m| m.id == message_id) {
            message.content = content;
        }
        chat.updated_at = Utc::now();

        self.persist(&next).await?;
        *cache = next;
        Ok(true)
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<bool> {
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        let Some(chat) = find_message_mut(&mut next.chats, message_id) else {
            return Ok(false);
        };
        chat.messages.retain(|m| m.id != message_id);
        chat.updated_at = Utc::now();

        self.persist(&next).await?;
        *cache = next;
        Ok(true)
    }

    async fn global_settings(&self) -> Result<GlobalSettings> {
        let cache = self.cache.read().await;
        Ok(cache.global_settings.clone())
    }

    async fn update_global_settings(&self, settings: GlobalSettings) -> Result<GlobalSettings> {
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        next.global_settings = settings.clone();

        self.persist(&next).await?;
        *cache = next;
        Ok(settings)
    }
}
