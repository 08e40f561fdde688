//! File-based agent storage implementation

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::model::{AgentDefinition, AgentSummary};
use super::repository::AgentRepository;
use crate::{Error, Result};

/// File-based agent store using JSON
pub struct FileAgentStore {
    path: PathBuf,
    cache: RwLock<HashMap<Uuid, AgentDefinition>>,
}

impl FileAgentStore {
    /// Create a new FileAgentStore
    ///
    /// If the file doesn't exist, it will be created on first write.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let agents: Vec<AgentDefinition> = serde_json::from_str(&content)?;
            debug!(path = %path.display(), count = agents.len(), "Loaded agents");
            agents.into_iter().map(|a| (a.id, a)).collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// Write `agents` to disk
    async fn persist(&self, agents: &HashMap<Uuid, AgentDefinition>) -> Result<()> {
        let agents: Vec<&AgentDefinition> = agents.values().collect();
        let content = serde_json::to_string_pretty(&agents)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentRepository for FileAgentStore {
    async fn create(&self, agent: AgentDefinition) -> Result<AgentDefinition> {
        let mut cache = self.cache.write().await;
        if cache.contains_key(&agent.id) {
            return Err(Error::InvalidInput(format!(
                "Agent with ID {} already exists",
                agent.id
            )));
        }

        let mut next = cache.clone();
        next.insert(agent.id, agent.clone());
        self.persist(&next).await?;
        *cache = next;
        Ok(agent)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AgentDefinition>> {
        let cache = self.cache.read().await;
        Ok(cache.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<AgentSummary>> {
        let cache = self.cache.read().await;
        let mut agents: Vec<&AgentDefinition> = cache.values().collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(agents.into_iter().map(AgentSummary::from).collect())
    }

    async fn update(&self, mut agent: AgentDefinition) -> Result<AgentDefinition> {
        let mut cache = self.cache.write().await;
        let existing = cache
            .get(&agent.id)
            .ok_or_else(|| Error::AgentNotFound(agent.id.to_string()))?;
        agent.created_at = existing.created_at;
        agent.updated_at = Utc::now();

        let mut next = cache.clone();
        next.insert(agent.id, agent.clone());
        self.persist(&next).await?;
        *cache = next;
        Ok(agent)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut cache = self.cache.write().await;
        if !cache.contains_key(&id) {
            return Ok(false);
        }

        let mut next = cache.clone();
        next.remove(&id);
        self.persist(&next).await?;
        *cache = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Condition, StepDefinition};
    use tempfile::TempDir;

    fn sample_agent() -> AgentDefinition {
        AgentDefinition::new(
            "Support",
            vec![
                StepDefinition::new("topic", "Classify.", "{prompt}"),
                StepDefinition::new("refund", "Refunds.", "{prompt}")
                    .with_condition(Condition::matching("topic", "refund")),
                StepDefinition::new("answer", "Answer.", "{prompt} {refund}"),
            ],
        )
    }

    #[tokio::test]
    async fn test_create_preserves_step_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileAgentStore::new(temp_dir.path().join("agents.json"))
            .await
            .unwrap();

        let agent = store.create(sample_agent()).await.unwrap();
        let loaded = store.get(agent.id).await.unwrap().unwrap();
        let names: Vec<&str> = loaded.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["topic", "refund", "answer"]);
    }

    #[tokio::test]
    async fn test_update_missing_agent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileAgentStore::new(temp_dir.path().join("agents.json"))
            .await
            .unwrap();

        let result = store.update(sample_agent()).await;
        assert!(matches!(result, Err(Error::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_steps() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agents.json");
        let store = FileAgentStore::new(&path).await.unwrap();
        let mut agent = store.create(sample_agent()).await.unwrap();

        agent.name = "Renamed".to_string();
        agent.steps.truncate(1);
        store.update(agent.clone()).await.unwrap();

        let reopened = FileAgentStore::new(&path).await.unwrap();
        let loaded = reopened.get(agent.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.steps.len(), 1);
        assert_eq!(reopened.list().await.unwrap()[0].step_count, 1);
    }

    #[tokio::test]
    async fn test_delete_agent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileAgentStore::new(temp_dir.path().join("agents.json"))
            .await
            .unwrap();
        let agent = store.create(sample_agent()).await.unwrap();

        assert!(store.delete(agent.id).await.unwrap());
        assert!(store.get(agent.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_agents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agents.json");
        let store = FileAgentStore::new(&path).await.unwrap();
        let agent = store.create(sample_agent()).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.create(sample_agent()).await.is_err());
        assert!(store.delete(agent.id).await.is_err());
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, agent.id);
    }
}
