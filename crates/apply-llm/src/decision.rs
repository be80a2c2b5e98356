//! Decision port contract and retry wrapper.

use async_trait::async_trait;
use rand::Rng as _;
use thiserror::Error;
use tracing::warn;

use apply_core::retry::{RetryConfig, backoff_delay_ms};
use apply_core::tools::{ToolCall, ToolDefinition};
use apply_core::transcript::Transcript;

/// Everything the decision engine sees when choosing the next action.
pub struct DecisionRequest<'a> {
    /// The fixed system instruction for this kind of run.
    pub system_prompt: &'a str,
    /// The full ordered history of the run so far.
    pub transcript: &'a Transcript,
    /// The tool contract schemas.
    pub tools: &'a [ToolDefinition],
}

/// One decision from the engine: exactly one tool call, plus any
/// free-text commentary the model produced alongside it.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// The chosen tool call.
    pub call: ToolCall,
    /// Assistant commentary, if any.
    pub commentary: Option<String>,
}

/// Decision port failures.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// The endpoint answered with a non-success HTTP status.
    #[error("decision endpoint returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// The request never completed (connect, timeout, TLS).
    #[error("decision transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered but not with a usable tool call.
    #[error("malformed decision response: {message}")]
    Malformed {
        /// What was wrong with the response.
        message: String,
    },

    /// The retry budget is exhausted. Terminal: the loop treats this as a
    /// non-retryable port failure.
    #[error("decision service unavailable after {attempts} attempts: {last}")]
    Unavailable {
        /// Total attempts made.
        attempts: u32,
        /// Description of the last failure.
        last: String,
    },
}

impl DecisionError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(&u32::from(*status))
            }
            Self::Transport(_) | Self::Malformed { .. } => true,
            Self::Unavailable { .. } => false,
        }
    }
}

/// The decision port: inspect the transcript, return the next tool call.
#[async_trait]
pub trait DecisionClient: Send + Sync {
    /// Choose the next tool call for the given request.
    async fn decide(&self, request: &DecisionRequest<'_>) -> Result<Decision, DecisionError>;
}

/// Call the decision port with bounded retry on transient faults.
///
/// Retryable errors are retried with jittered exponential backoff up to
/// `retry.max_retries` additional attempts; persistent failure surfaces as
/// [`DecisionError::Unavailable`]. Non-retryable errors short-circuit.
pub async fn decide_with_retry(
    client: &dyn DecisionClient,
    request: &DecisionRequest<'_>,
    retry: &RetryConfig,
) -> Result<Decision, DecisionError> {
    let mut attempt: u32 = 0;
    loop {
        match client.decide(request).await {
            Ok(decision) => return Ok(decision),
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                let delay = backoff_delay_ms(retry, attempt, rand::rng().random::<f64>());
                warn!(attempt, delay_ms = delay, error = %err, "decision attempt failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                return Err(DecisionError::Unavailable {
                    attempts: attempt + 1,
                    last: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
}
