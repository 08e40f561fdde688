//! Chat API endpoints
//!
//! `POST /api/chat[/{chat_id}]` saves the user message, runs the selected agent
//! (or the default conversation) and streams the reply framed per the
//! response protocol. Message ids travel in response headers.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use agent_runner::protocol::{
    CONTENT_TYPE, HEADER_AI_MESSAGE_ID, HEADER_CHAT_ID, HEADER_REDIRECT, HEADER_SENT_MESSAGE_ID,
};
use agent_runner::{compile, relay_response, ConversationTurn, ExecutionContext, ExecutionPlan};
use chat_core::chat::{Chat, ChatSettings, ChatSummary, Sender};

use super::{error, internal, invalid_field, ApiError};
use crate::state::AppState;

const SEND_MESSAGE_INTENT: &str = "sendMessage";

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageForm {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}

/// Validated send-message input
struct SendMessage {
    message: String,
    prompt: Option<String>,
    agent: Option<Uuid>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SendMessageForm {
    fn validate(self) -> Result<SendMessage, ApiError> {
        if self.intent.as_deref().map(str::trim) != Some(SEND_MESSAGE_INTENT) {
            return Err(invalid_field("intent", "Invalid intent"));
        }
        let message =
            non_empty(self.message).ok_or_else(|| invalid_field("message", "Message is required"))?;
        let agent = match non_empty(self.agent) {
            Some(raw) => Some(
                Uuid::parse_str(&raw).map_err(|_| invalid_field("agent", "Invalid agent"))?,
            ),
            None => None,
        };

        Ok(SendMessage {
            message,
            prompt: non_empty(self.prompt),
            agent,
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/chat - Start a new chat with its first message
async fn send_to_new_chat(
    State(state): State<AppState>,
    Form(form): Form<SendMessageForm>,
) -> Result<Response, ApiError> {
    send_message(state, None, form).await
}

/// POST /api/chat/{chat_id} - Send a message to an existing chat
async fn send_to_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Form(form): Form<SendMessageForm>,
) -> Result<Response, ApiError> {
    send_message(state, Some(chat_id), form).await
}

async fn send_message(
    state: AppState,
    chat_id: Option<Uuid>,
    form: SendMessageForm,
) -> Result<Response, ApiError> {
    let input = form.validate()?;
    let store = state.chat_store();

    let chat = match chat_id {
        Some(id) => Some(
            store
                .get_chat(id)
                .await
                .map_err(|e| internal(e, "Could not load chat"))?
                .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("Chat {} not found", id)))?,
        ),
        None => None,
    };
    let global = store
        .global_settings()
        .await
        .map_err(|e| internal(e, "Could not load settings"))?;

    let agent_id = chat
        .as_ref()
        .and_then(|c| c.settings.agent_id)
        .or(input.agent);
    let system_prompt = [
        input.prompt.as_deref(),
        chat.as_ref().and_then(|c| c.settings.prompt.as_deref()),
        global.prompt.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|p| !p.is_empty())
    .unwrap_or(state.default_system_prompt())
    .to_string();

    let plan = match agent_id {
        Some(id) => {
            let agent = state
                .agent_store()
                .get(id)
                .await
                .map_err(|e| internal(e, "Could not load agent"))?
                .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("Agent {} not found", id)))?;
            compile(&agent).map_err(|e| internal(e, "Agent definition is invalid"))?
        }
        None => ExecutionPlan::default_conversation(&system_prompt),
    };

    let history = chat.as_ref().map(Chat::history).unwrap_or_default();

    // UserMessageSaved
    let (chat_id, sent_message_id, created_chat) = match chat {
        Some(chat) => {
            let sent = store
                .add_message(chat.id, Sender::Human, input.message.clone())
                .await
                .map_err(|e| internal(e, "Could not send message"))?;
            (chat.id, sent.id, false)
        }
        None => {
            let settings = ChatSettings {
                prompt: input.prompt.clone(),
                agent_id,
            };
            let chat = store
                .create_chat(Chat::new(Chat::name_from_message(&input.message)).with_settings(settings))
                .await
                .map_err(|e| internal(e, "Could not create chat"))?;

            match store
                .add_message(chat.id, Sender::Human, input.message.clone())
                .await
            {
                Ok(sent) => (chat.id, sent.id, true),
                Err(e) => {
                    if let Err(cleanup) = store.delete_chat(chat.id).await {
                        warn!(chat_id = %chat.id, error = %cleanup, "Failed to remove chat after first message failed");
                    }
                    return Err(internal(e, "Could not create chat"));
                }
            }
        }
    };
    let mut turn = ConversationTurn::new(chat_id, sent_message_id, created_chat);
    info!(%chat_id, message_id = %sent_message_id, plan = plan.name(), "User message saved");

    // Cancels the run if this handler is dropped before the body takes over
    let cancel = CancellationToken::new();
    let abort_guard = cancel.clone().drop_guard();

    let mut context = ExecutionContext::from_history(input.message, history);
    let stream = state
        .executor()
        .run(&plan, &mut context, &cancel)
        .await
        .map_err(|e| internal(e, "Could not generate a response"))?;

    let ai_message = store
        .add_message(chat_id, Sender::Ai, String::new())
        .await
        .map_err(|e| internal(e, "Could not create AI message"))?;
    turn.placeholder_created(ai_message.id)
        .map_err(|e| internal(e, "Could not create AI message"))?;

    let redirect = turn.redirect_to().unwrap_or_default();
    let body = Body::from_stream(relay_response(stream, store.clone(), turn, cancel));
    abort_guard.disarm();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE)
        .header(HEADER_AI_MESSAGE_ID, ai_message.id.to_string())
        .header(HEADER_CHAT_ID, chat_id.to_string())
        .header(HEADER_SENT_MESSAGE_ID, sent_message_id.to_string())
        .header(HEADER_REDIRECT, redirect)
        .body(body)
        .map_err(|e| internal(e, "Could not start response"))
}

/// GET /api/chats - List chats, newest first
async fn list_chats(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    let chats = state
        .chat_store()
        .list_chats()
        .await
        .map_err(|e| internal(e, "Could not load chats"))?;
    Ok(Json(chats))
}

/// GET /api/chat/{chat_id} - Get a chat with its messages
async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<Chat>, ApiError> {
    state
        .chat_store()
        .get_chat(chat_id)
        .await
        .map_err(|e| internal(e, "Could not load chat"))?
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("Chat {} not found", chat_id)))
}

/// DELETE /api/chat/{chat_id} - Delete a chat
async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .chat_store()
        .delete_chat(chat_id)
        .await
        .map_err(|e| internal(e, "Could not delete chat"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(StatusCode::NOT_FOUND, format!("Chat {} not found", chat_id)))
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(send_to_new_chat))
        .route(
            "/api/chat/{chat_id}",
            get(get_chat).post(send_to_chat).delete(delete_chat),
        )
        .route("/api/chats", get(list_chats))
}
