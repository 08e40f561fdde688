//! Agent executor - runs a compiled plan against one chat turn

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compiler::{ExecutionPlan, Unit};
use crate::context::ExecutionContext;
use crate::error::{Result, RunnerError};
use crate::model::{ModelBackend, ModelRequest, ModelStream};

/// Configuration for the agent executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bound on each blocking intermediate-step call
    pub step_timeout: Duration,
    /// Bound on the whole final-step stream
    pub stream_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(120),
            stream_timeout: Duration::from_secs(300),
        }
    }
}

/// Runs execution plans against a model backend
#[derive(Clone)]
pub struct AgentExecutor {
    backend: Arc<dyn ModelBackend>,
    config: ExecutorConfig,
}

impl AgentExecutor {
    pub fn new(backend: Arc<dyn ModelBackend>, config: ExecutorConfig) -> Self {
        Self { backend, config }
    }

    /// Run `plan` against `context`.
    ///
    /// Intermediate units run strictly in order, each one completing before
    /// the next is evaluated; their outputs are recorded in `context` under
    /// the step name (empty when skipped). The final unit's output is returned
    /// as a stream. Any intermediate failure aborts the whole run.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        context: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ModelStream> {
        info!(
            plan = plan.name(),
            agent_id = ?plan.agent_id(),
            units = plan.len(),
            "Running execution plan"
        );

        for unit in plan.units() {
            match unit {
                Unit::Conditional { gate, prompt } => {
                    let step = prompt.step_name();
                    if !gate.should_run(context, context.history_non_empty()) {
                        debug!(step, "Step skipped");
                        context.record(step, "");
                        continue;
                    }

                    let request = prompt.render(context);
                    let output = self.invoke_step(step, request, cancel).await?;
                    debug!(step, chars = output.len(), "Step completed");
                    if !context.record(step, output) {
                        warn!(step, "Step output already recorded, keeping first value");
                    }
                }
                Unit::Final { prompt } => {
                    let request = prompt.render(context);
                    debug!(step = prompt.step_name(), "Starting final step stream");
                    // One deadline covers opening the stream and reading it
                    let timeout = self.config.stream_timeout;
                    let deadline = Instant::now() + timeout;
                    let stream = tokio::select! {
                        _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
                        started = tokio::time::timeout_at(deadline, self.backend.stream(request)) => {
                            started.map_err(|_| RunnerError::Timeout { after: timeout })??
                        }
                    };
                    return Ok(bounded(stream, deadline, timeout, cancel.clone()));
                }
            }
        }

        Err(RunnerError::definition("execution plan has no final unit"))
    }

    async fn invoke_step(
        &self,
        step: &str,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        debug!(step, "Invoking model for intermediate step");
        let timeout = self.config.step_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
            result = tokio::time::timeout(timeout, self.backend.invoke(request)) => {
                let output = result.map_err(|_| RunnerError::Timeout { after: timeout })??;
                Ok(output.content)
            }
        }
    }
}

/// Wrap a model stream with an overall deadline and a cancellation signal.
/// The inner stream is dropped as soon as either fires.
fn bounded(
    stream: ModelStream,
    deadline: Instant,
    timeout: Duration,
    cancel: CancellationToken,
) -> ModelStream {
    Box::pin(async_stream::stream! {
        let mut stream = stream;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    yield Err(RunnerError::Cancelled);
                    break;
                }
                next = tokio::time::timeout_at(deadline, stream.next()) => match next {
                    Err(_) => {
                        yield Err(RunnerError::Timeout { after: timeout });
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(item)) => {
                        let failed = item.is_err();
                        yield item;
                        if failed {
                            break;
                        }
                    }
                },
            }
        }
    })
}
