//! Client side of the chat streaming endpoint

use futures::stream::{BoxStream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, RunnerError};
use crate::protocol::{
    decode_stream, demux, HEADER_AI_MESSAGE_ID, HEADER_CHAT_ID, HEADER_REDIRECT,
    HEADER_SENT_MESSAGE_ID,
};

/// Form fields of a send-message request
#[derive(Debug, Clone, Default)]
pub struct SendMessageRequest {
    pub message: String,
    /// Per-message system prompt override
    pub prompt: Option<String>,
    /// Agent to use when starting a new chat
    pub agent: Option<Uuid>,
}

impl SendMessageRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

/// An accepted message whose reply is still streaming
pub struct SentMessage {
    pub ai_message_id: Uuid,
    pub chat_id: Uuid,
    pub sent_message_id: Uuid,
    /// Where to navigate when the request created a new chat
    pub redirect_to: Option<String>,
    /// Reply text deltas, in order
    pub text: BoxStream<'static, Result<String>>,
    /// Resolves once `text` has been fully consumed
    pub success: oneshot::Receiver<bool>,
}

impl SentMessage {
    /// Drain the reply, returning the full text and the success flag
    pub async fn into_reply(self) -> Result<(String, bool)> {
        let mut text = String::new();
        let mut deltas = self.text;
        while let Some(delta) = deltas.next().await {
            text.push_str(&delta?);
        }
        let success = self.success.await.unwrap_or(false);
        Ok((text, success))
    }
}

/// HTTP client for the chat API
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Post a message to `chat_id`, or to a new chat when `None`
    pub async fn send_message(
        &self,
        chat_id: Option<Uuid>,
        request: SendMessageRequest,
    ) -> Result<SentMessage> {
        let url = match chat_id {
            Some(id) => format!("{}/api/chat/{}", self.base_url, id),
            None => format!("{}/api/chat", self.base_url),
        };

        let mut form = vec![
            ("intent", "sendMessage".to_string()),
            ("message", request.message),
        ];
        if let Some(prompt) = request.prompt {
            form.push(("prompt", prompt));
        }
        if let Some(agent) = request.agent {
            form.push(("agent", agent.to_string()));
        }

        debug!(%url, "Sending chat message");
        let res = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| RunnerError::protocol(format!("Failed to reach chat server: {}", e)))?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RunnerError::not_found(
                "chat",
                chat_id.map(|id| id.to_string()).unwrap_or_default(),
            ));
        }
        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            return Err(RunnerError::protocol(format!(
                "Chat server returned {}: {}",
                status, error_text
            )));
        }

        let headers = res.headers();
        let ai_message_id = uuid_header(headers, HEADER_AI_MESSAGE_ID)?;
        let chat_id = uuid_header(headers, HEADER_CHAT_ID)?;
        let sent_message_id = uuid_header(headers, HEADER_SENT_MESSAGE_ID)?;
        let redirect_to = header(headers, HEADER_REDIRECT)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let (text, success) = demux(decode_stream(res.bytes_stream()));
        Ok(SentMessage {
            ai_message_id,
            chat_id,
            sent_message_id,
            redirect_to,
            text,
            success,
        })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Uuid> {
    let value = header(headers, name)
        .ok_or_else(|| RunnerError::protocol(format!("missing {} header", name)))?;
    Uuid::parse_str(value)
        .map_err(|e| RunnerError::protocol(format!("invalid {} header: {}", name, e)))
}
