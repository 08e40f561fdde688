//! Scripted model backend for tests
//!
//! Records every request it receives and answers from a script, so executor
//! and relay behaviour can be checked without a live model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, RunnerError};
use crate::model::{ModelBackend, ModelOutput, ModelRequest, ModelStream};

type Responder = Box<dyn Fn(&ModelRequest) -> Result<String> + Send + Sync>;

/// How a scripted stream ends after its chunks
#[derive(Debug, Clone)]
pub enum StreamEnd {
    Complete,
    Fail(String),
    /// Never yields again; only cancellation or drop ends it
    Hang,
}

#[derive(Debug, Clone)]
struct StreamScript {
    chunks: Vec<String>,
    end: StreamEnd,
}

/// Model backend driven by a script
pub struct ScriptedModel {
    responder: Responder,
    invoke_delay: Option<Duration>,
    stream_start_delay: Option<Duration>,
    chunk_delay: Option<Duration>,
    script: Option<StreamScript>,
    stream_start_error: Option<String>,
    invocations: Mutex<Vec<ModelRequest>>,
    streamed: Mutex<Vec<ModelRequest>>,
    stream_dropped: Arc<AtomicBool>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    /// Echoes the human prompt for both blocking and streaming calls
    pub fn new() -> Self {
        Self {
            responder: Box::new(|request| Ok(request.human_prompt.clone())),
            invoke_delay: None,
            stream_start_delay: None,
            chunk_delay: None,
            script: None,
            stream_start_error: None,
            invocations: Mutex::new(Vec::new()),
            streamed: Mutex::new(Vec::new()),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn reply_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<String> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    pub fn invoke_delay(mut self, delay: Duration) -> Self {
        self.invoke_delay = Some(delay);
        self
    }

    /// Delay before `stream` hands out its stream
    pub fn stream_start_delay(mut self, delay: Duration) -> Self {
        self.stream_start_delay = Some(delay);
        self
    }

    /// Delay before each scripted chunk
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn stream_script<S: Into<String>>(mut self, chunks: Vec<S>, end: StreamEnd) -> Self {
        self.script = Some(StreamScript {
            chunks: chunks.into_iter().map(Into::into).collect(),
            end,
        });
        self
    }

    /// Make `stream` fail before yielding anything
    pub fn fail_stream_start(mut self, message: impl Into<String>) -> Self {
        self.stream_start_error = Some(message.into());
        self
    }

    /// Requests received by `invoke`, in order
    pub fn invocations(&self) -> Vec<ModelRequest> {
        lock(&self.invocations).clone()
    }

    /// Requests received by `stream`, in order
    pub fn streamed(&self) -> Vec<ModelRequest> {
        lock(&self.streamed).clone()
    }

    /// Whether the last stream handed out has been released
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelOutput> {
        lock(&self.invocations).push(request.clone());
        if let Some(delay) = self.invoke_delay {
            tokio::time::sleep(delay).await;
        }
        let content = (self.responder)(&request)?;
        Ok(ModelOutput { content })
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream> {
        lock(&self.streamed).push(request.clone());
        if let Some(delay) = self.stream_start_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.stream_start_error {
            return Err(RunnerError::model(message.clone()));
        }

        let script = self.script.clone().unwrap_or_else(|| StreamScript {
            chunks: vec![request.human_prompt],
            end: StreamEnd::Complete,
        });
        let delay = self.chunk_delay;
        self.stream_dropped.store(false, Ordering::SeqCst);
        let guard = DropFlag(self.stream_dropped.clone());

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for chunk in script.chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(chunk);
            }
            match script.end {
                StreamEnd::Complete => {}
                StreamEnd::Fail(message) => {
                    yield Err(RunnerError::model(message));
                }
                StreamEnd::Hang => futures::future::pending::<()>().await,
            }
        }))
    }
}
