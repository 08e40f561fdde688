//! Agent Runner - step compiler, executor and streaming response protocol
//!
//! An agent is an ordered list of steps. [`compile`] turns it into an
//! [`ExecutionPlan`], [`AgentExecutor`] runs the plan against a user prompt
//! and chat history, and [`relay_response`] streams the final step's output to
//! the client framed per [`protocol`], persisting it as it goes.

mod chat_client;
mod client;
mod compiler;
mod condition;
mod context;
mod error;
mod executor;
mod model;
pub mod protocol;
mod relay;
mod template;
mod turn;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chat_client::{ChatClient, SendMessageRequest, SentMessage};
pub use client::{ModelClient, ModelClientConfig};
pub use compiler::{compile, validate, ExecutionPlan, PromptUnit, Unit};
pub use condition::{should_run, CompiledCondition, Gate};
pub use context::{ExecutionContext, PromptMessage, CHAT_HISTORY_VAR, PROMPT_VAR};
pub use error::{Result, RunnerError};
pub use executor::{AgentExecutor, ExecutorConfig};
pub use model::{ModelBackend, ModelOutput, ModelRequest, ModelStream};
pub use relay::relay_response;
pub use template::{escape, render};
pub use turn::{ConversationTurn, TurnState};
