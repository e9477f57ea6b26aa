//! ScriptedProvider — deterministic streaming responses
//!
//! Each call to `complete_stream` consumes the next [`ScriptStep`]. When the
//! script runs out the default step is replayed.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// One scripted response.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Stream these chunks, then finish normally.
    Chunks(Vec<String>),
    /// Stream these chunks, then fail mid-stream.
    FailAfter { chunks: Vec<String>, error: String },
    /// Fail before any chunk is produced.
    Reject(String),
}

impl ScriptStep {
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }
}

pub struct ScriptedProvider {
    steps: Mutex<VecDeque<ScriptStep>>,
    default_step: ScriptStep,
    chunk_delay: Option<Duration>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    /// Always answer with the same step.
    pub fn constant(step: ScriptStep) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            default_step: step,
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with the steps in order, then with a short default text.
    pub fn sequence(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            default_step: ScriptStep::chunks(["(script exhausted)"]),
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Pause between chunks, to let tests act while a stream is in flight.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_step(&self) -> ScriptStep {
        self.steps
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.default_step.clone())
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        self.requests.lock().await.push(request);
        let step = self.next_step().await;
        let delay = self.chunk_delay;

        let (chunks, failure) = match step {
            ScriptStep::Reject(e) => return Err(LlmError::RequestFailed(e)),
            ScriptStep::Chunks(chunks) => (chunks, None),
            ScriptStep::FailAfter { chunks, error } => (chunks, Some(error)),
        };

        Ok(Box::pin(async_stream::stream! {
            for chunk in chunks {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                yield Ok(StreamDelta::Text(chunk));
            }
            match failure {
                Some(error) => {
                    yield Err(LlmError::StreamError(error));
                }
                None => {
                    yield Ok(StreamDelta::Done {
                        stop_reason: Some("end_turn".to_string()),
                        usage: None,
                    });
                }
            }
        }))
    }
}
