//! Application state

use std::sync::Arc;

use agent_runner::{AgentExecutor, ModelBackend, ModelClient};
use chat_core::agent::{AgentRepository, FileAgentStore};
use chat_core::chat::{ChatRepository, FileChatStore};

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    chat_store: Arc<dyn ChatRepository>,
    agent_store: Arc<dyn AgentRepository>,
    executor: AgentExecutor,
    default_system_prompt: String,
}

impl AppState {
    /// Open the JSON stores under the data directory and connect the model client
    pub async fn new(config: &ServerConfig) -> chat_core::Result<Self> {
        let chat_store = FileChatStore::new(config.data_dir.join("chats.json")).await?;
        let agent_store = FileAgentStore::new(config.data_dir.join("agents.json")).await?;
        let backend: Arc<dyn ModelBackend> = Arc::new(ModelClient::new(config.model.clone()));

        Ok(Self::with_parts(
            Arc::new(chat_store),
            Arc::new(agent_store),
            AgentExecutor::new(backend, config.executor.clone()),
            config.default_system_prompt.clone(),
        ))
    }

    pub fn with_parts(
        chat_store: Arc<dyn ChatRepository>,
        agent_store: Arc<dyn AgentRepository>,
        executor: AgentExecutor,
        default_system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                chat_store,
                agent_store,
                executor,
                default_system_prompt: default_system_prompt.into(),
            }),
        }
    }

    pub fn chat_store(&self) -> &Arc<dyn ChatRepository> {
        &self.inner.chat_store
    }

    pub fn agent_store(&self) -> &Arc<dyn AgentRepository> {
        &self.inner.agent_store
    }

    pub fn executor(&self) -> &AgentExecutor {
        &self.inner.executor
    }

    pub fn default_system_prompt(&self) -> &str {
        &self.inner.default_system_prompt
    }
}
