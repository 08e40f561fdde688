//! Per-turn execution context
//!
//! Maps variable names to rendered text. Seeded with the user prompt and the
//! chat history, then grown by one entry per step in definition order. Entries
//! are never overwritten.

use std::collections::HashMap;

use chat_core::chat::Sender;
use serde::{Deserialize, Serialize};

/// Variable holding the raw user message
pub const PROMPT_VAR: &str = "prompt";

/// Variable holding the chat history transcript
pub const CHAT_HISTORY_VAR: &str = "chat_history";

/// A message passed to the model ahead of the human prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Sender,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Sender, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Variable bindings visible to templates and conditions
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    values: HashMap<String, String>,
    history: Vec<PromptMessage>,
}

impl ExecutionContext {
    pub fn new(prompt: impl Into<String>, history: Vec<PromptMessage>) -> Self {
        let mut values = HashMap::new();
        values.insert(PROMPT_VAR.to_string(), prompt.into());
        values.insert(CHAT_HISTORY_VAR.to_string(), transcript(&history));
        Self { values, history }
    }

    /// Build a context from stored `(sender, content)` pairs
    pub fn from_history(prompt: impl Into<String>, history: Vec<(Sender, String)>) -> Self {
        let history = history
            .into_iter()
            .map(|(role, content)| PromptMessage { role, content })
            .collect();
        Self::new(prompt, history)
    }

    /// Value bound to `name`, if any
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether `name` is bound to a non-empty value
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    pub fn prompt(&self) -> &str {
        self.get(PROMPT_VAR).unwrap_or_default()
    }

    pub fn history(&self) -> &[PromptMessage] {
        &self.history
    }

    pub fn history_non_empty(&self) -> bool {
        !self.history.is_empty()
    }

    /// Record a step output. Returns `false` and leaves the context untouched
    /// if `name` is already bound.
    pub fn record(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.values.contains_key(name) {
            return false;
        }
        self.values.insert(name.to_string(), value.into());
        true
    }
}

fn transcript(history: &[PromptMessage]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            Sender::Human => format!("Human: {}", m.content),
            Sender::Ai => format!("AI: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
