//! Versioned message envelope exchanged between the coordinator and executors.
//!
//! In-process runs use the envelopes for uniform logging through the
//! [`ExecutionObserver`](crate::coordinator::ExecutionObserver); out-of-process
//! executors ([`ProcessSkill`](crate::process::ProcessSkill)) receive and
//! answer them as JSON.

use crate::error::OrchestratorError;
use crate::state::Progress;
use crate::task::{AgentOutput, SkillInput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    TaskRequest,
    TaskResponse,
    StatusUpdate,
    ErrorMessage,
    HealthCheck,
}

/// A payload type and the envelope type it travels under.
pub trait Payload {
    const MESSAGE_TYPE: MessageType;
}

/// The envelope. Built once per logical event and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessage<T> {
    pub version: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: T,
}

impl<T: Payload> ProtocolMessage<T> {
    pub fn new(payload: T) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            message_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            message_type: T::MESSAGE_TYPE,
            payload,
        }
    }
}

impl<T> ProtocolMessage<T> {
    /// True when the major version matches [`PROTOCOL_VERSION`].
    pub fn is_compatible(&self) -> bool {
        major(&self.version) == major(PROTOCOL_VERSION)
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Retry settings carried on a [`TaskRequest`] and applied by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay_ms: u64,
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay_ms: 1000,
            exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: duration_ms(delay),
            exponential_backoff: true,
        }
    }

    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `delay_ms * 2^(attempt-1)` with backoff, `delay_ms` otherwise.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = if self.exponential_backoff {
            let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
            self.delay_ms.saturating_mul(factor)
        } else {
            self.delay_ms
        };
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_id: String,
    pub input: SkillInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl Payload for TaskRequest {
    const MESSAGE_TYPE: MessageType = MessageType::TaskRequest;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: String,
    pub output: AgentOutput,
}

impl Payload for TaskResponse {
    const MESSAGE_TYPE: MessageType = MessageType::TaskResponse;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Started,
    Retrying,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub workflow_id: String,
    pub task_id: String,
    pub phase: TaskPhase,
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Payload for StatusUpdate {
    const MESSAGE_TYPE: MessageType = MessageType::StatusUpdate;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub task_id: String,
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

impl ErrorMessage {
    pub fn from_error(task_id: impl Into<String>, error: &OrchestratorError) -> Self {
        Self {
            task_id: task_id.into(),
            code: error.code().to_string(),
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }
}

impl Payload for ErrorMessage {
    const MESSAGE_TYPE: MessageType = MessageType::ErrorMessage;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub component: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Payload for HealthCheck {
    const MESSAGE_TYPE: MessageType = MessageType::HealthCheck;
}
