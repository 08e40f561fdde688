//! Conversation turn persistence state
//!
//! ```text
//! UserMessageSaved -> AiPlaceholderCreated -> AiMessageFinalized
//!                                          \-> AiMessageDeleted
//! ```
//!
//! A placeholder AI message is created before streaming starts. It is either
//! finalized with the full text or deleted; it is never left truncated.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, RunnerError};

/// Persistence state of one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    UserMessageSaved,
    AiPlaceholderCreated,
    AiMessageFinalized,
    AiMessageDeleted,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AiMessageFinalized | Self::AiMessageDeleted)
    }

    pub fn can_transition_to(&self, next: TurnState) -> bool {
        matches!(
            (self, next),
            (Self::UserMessageSaved, Self::AiPlaceholderCreated)
                | (Self::AiPlaceholderCreated, Self::AiMessageFinalized)
                | (Self::AiPlaceholderCreated, Self::AiMessageDeleted)
        )
    }
}

/// One user message and the AI reply being produced for it
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub chat_id: Uuid,
    pub user_message_id: Uuid,
    pub ai_message_id: Option<Uuid>,
    /// True when the chat was created by this turn
    pub created_chat: bool,
    ai_text: String,
    state: TurnState,
}

impl ConversationTurn {
    pub fn new(chat_id: Uuid, user_message_id: Uuid, created_chat: bool) -> Self {
        Self {
            chat_id,
            user_message_id,
            ai_message_id: None,
            created_chat,
            ai_text: String::new(),
            state: TurnState::UserMessageSaved,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn ai_text(&self) -> &str {
        &self.ai_text
    }

    /// Redirect target for the client, set only when this turn created the chat
    pub fn redirect_to(&self) -> Option<String> {
        self.created_chat.then(|| format!("/chat/{}", self.chat_id))
    }

    fn advance(&mut self, next: TurnState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(RunnerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn placeholder_created(&mut self, ai_message_id: Uuid) -> Result<()> {
        self.advance(TurnState::AiPlaceholderCreated)?;
        self.ai_message_id = Some(ai_message_id);
        Ok(())
    }

    /// Append a model delta to the persisted text. Leading whitespace of the
    /// reply is dropped; returns the text actually appended.
    pub fn push_delta<'a>(&mut self, delta: &'a str) -> &'a str {
        let delta = if self.ai_text.is_empty() {
            delta.trim_start()
        } else {
            delta
        };
        self.ai_text.push_str(delta);
        delta
    }

    pub fn finalized(&mut self) -> Result<()> {
        self.advance(TurnState::AiMessageFinalized)
    }

    pub fn deleted(&mut self) -> Result<()> {
        self.advance(TurnState::AiMessageDeleted)
    }
}
