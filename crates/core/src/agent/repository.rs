//! Agent repository trait

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{AgentDefinition, AgentSummary};
use crate::Result;

/// Repository interface for agent definitions
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Create a new agent
    async fn create(&self, agent: AgentDefinition) -> Result<AgentDefinition>;

    /// Get an agent with its steps by ID
    async fn get(&self, id: Uuid) -> Result<Option<AgentDefinition>>;

    /// List agents, newest first
    async fn list(&self) -> Result<Vec<AgentSummary>>;

    /// Replace an existing agent's name and steps
    async fn update(&self, agent: AgentDefinition) -> Result<AgentDefinition>;

    /// Delete an agent by ID
    async fn delete(&self, id: Uuid) -> Result<bool>;
}
