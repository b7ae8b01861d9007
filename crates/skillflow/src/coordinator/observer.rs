//! Receivers for the protocol envelopes a run produces.

use crate::protocol::{
    ErrorMessage, ProtocolMessage, StatusUpdate, TaskPhase, TaskRequest, TaskResponse,
};
use tracing::{debug, info, warn};

/// Injected sink for every envelope emitted by the coordinator.
///
/// All methods default to no-ops so implementations can pick what they need.
pub trait ExecutionObserver: Send + Sync {
    fn on_request(&self, _message: &ProtocolMessage<TaskRequest>) {}

    fn on_response(&self, _message: &ProtocolMessage<TaskResponse>) {}

    fn on_status(&self, _message: &ProtocolMessage<StatusUpdate>) {}

    fn on_error(&self, _message: &ProtocolMessage<ErrorMessage>) {}
}

/// Forwards envelopes to `tracing`. The coordinator's default observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_request(&self, message: &ProtocolMessage<TaskRequest>) {
        debug!(
            message_id = %message.message_id,
            task_id = %message.payload.task_id,
            dependencies = ?message
                .payload
                .input
                .context
                .previous_outputs
                .keys()
                .collect::<Vec<_>>(),
            "Task request"
        );
    }

    fn on_response(&self, message: &ProtocolMessage<TaskResponse>) {
        let output = &message.payload.output;
        info!(
            message_id = %message.message_id,
            task_id = %message.payload.task_id,
            status = ?output.status,
            execution_ms = output.metadata.execution_time,
            "Task response"
        );
    }

    fn on_status(&self, message: &ProtocolMessage<StatusUpdate>) {
        let update = &message.payload;
        match update.phase {
            TaskPhase::Retrying | TaskPhase::Skipped => warn!(
                task_id = %update.task_id,
                phase = ?update.phase,
                detail = update.message.as_deref().unwrap_or(""),
                "Task status"
            ),
            _ => info!(
                task_id = %update.task_id,
                phase = ?update.phase,
                completed = update.progress.completed,
                total = update.progress.total,
                percentage = update.progress.percentage,
                "Task status"
            ),
        }
    }

    fn on_error(&self, message: &ProtocolMessage<ErrorMessage>) {
        let error = &message.payload;
        warn!(
            message_id = %message.message_id,
            task_id = %error.task_id,
            code = %error.code,
            recoverable = error.recoverable,
            "Task error: {}",
            error.message
        );
    }
}
