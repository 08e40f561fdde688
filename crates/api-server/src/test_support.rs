//! Shared fixtures for route tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agent_runner::testing::ScriptedModel;
use agent_runner::{AgentExecutor, ExecutorConfig};
use axum::Router;
use chat_core::agent::FileAgentStore;
use chat_core::chat::FileChatStore;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_SYSTEM_PROMPT;
use crate::state::AppState;

pub struct TestApp {
    pub state: AppState,
    pub model: Arc<ScriptedModel>,
    pub chats: Arc<FileChatStore>,
    pub agents: Arc<FileAgentStore>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new(model: ScriptedModel) -> Self {
        let dir = TempDir::new().unwrap();
        let chats = Arc::new(FileChatStore::new(dir.path().join("chats.json")).await.unwrap());
        let agents = Arc::new(FileAgentStore::new(dir.path().join("agents.json")).await.unwrap());
        let model = Arc::new(model);

        let executor = AgentExecutor::new(
            model.clone(),
            ExecutorConfig {
                step_timeout: Duration::from_secs(5),
                stream_timeout: Duration::from_secs(10),
            },
        );
        let state = AppState::with_parts(
            chats.clone(),
            agents.clone(),
            executor,
            DEFAULT_SYSTEM_PROMPT,
        );

        Self {
            state,
            model,
            chats,
            agents,
            _dir: dir,
        }
    }

    pub fn router(&self) -> Router {
        crate::app(self.state.clone())
    }

    /// Serve the app on an ephemeral local port
    pub async fn serve(&self) -> (SocketAddr, JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.router();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, handle)
    }
}
