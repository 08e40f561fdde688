use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use chat_core::chat::Sender;

use crate::error::{Result, RunnerError};
use crate::model::{ModelBackend, ModelOutput, ModelRequest, ModelStream};

/// Connection settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    /// Base URL, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Model backend speaking the chat completions protocol over HTTP
pub struct ModelClient {
    client: Client,
    config: ModelClientConfig,
}

impl ModelClient {
    pub fn new(config: ModelClientConfig) -> Self {
        Self {
            client: Client::builder().build().unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: &ModelRequest, stream: bool) -> Result<reqwest::Response> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: wire_messages(request),
            stream,
        };

        let url = self.url();
        debug!(%url, stream, "Sending completion request");
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        let res = req.send().await.map_err(|e| {
            error!(error = %e, %url, "Failed to reach model endpoint");
            RunnerError::model(format!("Failed to connect to model: {}", e))
        })?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            error!(%status, error = %error_text, "Model endpoint returned error");
            return Err(RunnerError::model(format!(
                "Model returned {}: {}",
                status, error_text
            )));
        }
        Ok(res)
    }
}

fn role(sender: Sender) -> &'static str {
    match sender {
        Sender::Human => "user",
        Sender::Ai => "assistant",
    }
}

fn wire_messages(request: &ModelRequest) -> Vec<WireMessage<'_>> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if !request.system_prompt.is_empty() {
        messages.push(WireMessage {
            role: "system",
            content: &request.system_prompt,
        });
    }
    messages.extend(request.history.iter().map(|m| WireMessage {
        role: role(m.role),
        content: &m.content,
    }));
    messages.push(WireMessage {
        role: "user",
        content: &request.human_prompt,
    });
    messages
}

/// Outcome of one server-sent event
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

fn parse_event(event: &str) -> Result<SseEvent> {
    // Multiple `data:` lines in one event are joined with newlines
    let data_lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if data_lines.is_empty() {
        return Ok(SseEvent::Skip);
    }
    let data = data_lines.join("\n");
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| RunnerError::model(format!("Malformed stream chunk: {}", e)))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map_or(SseEvent::Skip, SseEvent::Delta))
}

/// Splits a server-sent event body into complete events
///
/// Accepts LF and CRLF line endings. Incomplete UTF-8 sequences are held back
/// until the next chunk.
#[derive(Debug, Default)]
struct EventBuffer {
    text: String,
    pending: Vec<u8>,
}

impl EventBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let rest = self.pending.split_off(valid);
        self.text.push_str(&String::from_utf8_lossy(&self.pending));
        self.pending = rest;

        // A CR at the end may still pair with an LF from the next chunk
        if self.text.contains("\r\n") {
            self.text = self.text.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(idx) = self.text.find("\n\n") {
            events.push(self.text.drain(..idx + 2).collect());
        }
        events
    }

    /// Whatever is left once the body ends
    fn finish(mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
        }
        let rest = self.text.replace("\r\n", "\n");
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

#[async_trait]
impl ModelBackend for ModelClient {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelOutput> {
        let res = self.send(&request, false).await?;
        let body: CompletionResponse = res
            .json()
            .await
            .map_err(|e| RunnerError::model(format!("Malformed completion: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(ModelOutput { content })
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream> {
        let res = self.send(&request, true).await?;
        info!(model = %self.config.model, "Model stream opened");

        let mut body = Box::pin(res.bytes_stream());
        Ok(Box::pin(async_stream::stream! {
            let mut events = EventBuffer::default();

            while let Some(item) = body.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(RunnerError::model(format!("Stream error: {}", e)));
                        return;
                    }
                };

                for event in events.push(&chunk) {
                    match parse_event(&event) {
                        Ok(SseEvent::Delta(text)) => {
                            yield Ok(text);
                        }
                        Ok(SseEvent::Skip) => {}
                        Ok(SseEvent::Done) => return,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if let Some(event) = events.finish() {
                match parse_event(&event) {
                    Ok(SseEvent::Delta(text)) => {
                        yield Ok(text);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(e);
                    }
                }
            }
        }))
    }
}
