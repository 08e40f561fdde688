//! Model backend contract

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::context::PromptMessage;
use crate::error::Result;

/// Stream of text deltas produced by a model
pub type ModelStream = BoxStream<'static, Result<String>>;

/// One model call: system prompt, prior messages, then the human prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    /// Seed messages followed by chat history, oldest first
    pub history: Vec<PromptMessage>,
    pub human_prompt: String,
}

/// Complete output of a blocking model call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub content: String,
}

/// A language-model backend
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run the request to completion and return the full text
    async fn invoke(&self, request: ModelRequest) -> Result<ModelOutput>;

    /// Start the request and return its text deltas as they arrive.
    /// Dropping the stream cancels the request.
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream>;
}
