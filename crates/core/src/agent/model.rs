//! Agent model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::Sender;

/// Gating rule on a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// `prompt` or the name of an earlier step
    pub variable: String,
    /// Optional case-insensitive pattern the variable must match
    #[serde(default)]
    pub regex: Option<String>,
}

impl Condition {
    pub fn present(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            regex: None,
        }
    }

    pub fn matching(variable: impl Into<String>, regex: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            regex: Some(regex.into()),
        }
    }
}

/// Few-shot message inserted before the chat history of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedMessage {
    pub from: Sender,
    pub content: String,
}

/// One stage of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Unique within the agent; names the step's output variable
    pub name: String,
    pub system_template: String,
    pub message_template: String,
    #[serde(default)]
    pub include_chat_history: bool,
    #[serde(default)]
    pub only_if_previous_messages: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub messages: Vec<SeedMessage>,
}

impl StepDefinition {
    pub fn new(
        name: impl Into<String>,
        system_template: impl Into<String>,
        message_template: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            system_template: system_template.into(),
            message_template: message_template.into(),
            include_chat_history: false,
            only_if_previous_messages: false,
            conditions: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn with_chat_history(mut self) -> Self {
        self.include_chat_history = true;
        self
    }

    pub fn only_if_previous_messages(mut self) -> Self {
        self.only_if_previous_messages = true;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_message(mut self, from: Sender, content: impl Into<String>) -> Self {
        self.messages.push(SeedMessage {
            from,
            content: content.into(),
        });
        self
    }

    /// Whether the step runs on every turn
    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty() && !self.only_if_previous_messages
    }
}

/// Agent visibility
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// A named, ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub steps: Vec<StepDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visibility: Visibility::default(),
            steps,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Agent listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: Uuid,
    pub name: String,
    pub step_count: usize,
}

impl From<&AgentDefinition> for AgentSummary {
    fn from(agent: &AgentDefinition) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            step_count: agent.steps.len(),
        }
    }
}
