//! Out-of-process skills.
//!
//! A [`ProcessSkill`] spawns a configured command per invocation, writes one
//! `ProtocolMessage<TaskRequest>` as JSON to its stdin and reads the reply
//! from stdout. The reply is either a `TaskResponse` or an `ErrorMessage`
//! envelope.

use crate::error::TaskError;
use crate::protocol::{ErrorMessage, MessageType, ProtocolMessage, TaskRequest, TaskResponse};
use crate::task::{AgentOutput, Skill, SkillInput, Task};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

/// Skill backed by an external executable speaking the protocol over stdio.
#[derive(Debug, Clone)]
pub struct ProcessSkill {
    task: Task,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ProcessSkill {
    pub fn new(task: Task, program: impl Into<String>) -> Self {
        Self {
            task,
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Builds a skill from `[program, args..]`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `command` is empty.
    pub fn from_command(task: Task, command: &[String]) -> Result<Self, TaskError> {
        let (program, args) = command.split_first().ok_or_else(|| {
            TaskError::InvalidInput(format!("empty command for task '{}'", task.id))
        })?;
        Ok(Self::new(task, program.clone()).with_args(args.iter().cloned()))
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, envs: BTreeMap<String, String>) -> Self {
        self.env.extend(envs);
        self
    }

    pub fn with_cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl Skill for ProcessSkill {
    fn identity(&self) -> &Task {
        &self.task
    }

    async fn execute(&self, input: SkillInput) -> Result<AgentOutput, TaskError> {
        let request = ProtocolMessage::new(TaskRequest {
            task_id: self.task.id.clone(),
            input,
            timeout_ms: None,
            retry_policy: None,
        });
        let body = serde_json::to_vec(&request)?;

        debug!(task_id = %self.task.id, program = %self.program, "Spawning skill process");
        let mut child = self.build_command().spawn().map_err(|e| {
            error!(
                task_id = %self.task.id,
                program = %self.program,
                "Failed to spawn skill process: {}",
                e
            );
            TaskError::ProcessError(format!("failed to spawn '{}': {}", self.program, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&body).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TaskError::ProcessError(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| TaskError::ParseError(format!("stdout is not UTF-8: {}", e)))?;
        decode_reply(&stdout)
    }
}

/// Parses a worker's stdout into an output.
///
/// The whole stdout is tried first, then its last non-empty line, so workers
/// may log before answering.
pub fn decode_reply(stdout: &str) -> Result<AgentOutput, TaskError> {
    let envelope = parse_envelope(stdout.trim()).or_else(|first| {
        stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| parse_envelope(line.trim()))
            .unwrap_or(Err(first))
    })?;

    if !envelope.is_compatible() {
        return Err(TaskError::ParseError(format!(
            "unsupported protocol version '{}'",
            envelope.version
        )));
    }

    match envelope.message_type {
        MessageType::TaskResponse => {
            let response: TaskResponse = serde_json::from_value(envelope.payload)
                .map_err(|e| TaskError::ParseError(format!("malformed TaskResponse: {}", e)))?;
            Ok(response.output)
        }
        MessageType::ErrorMessage => {
            let reply: ErrorMessage = serde_json::from_value(envelope.payload)
                .map_err(|e| TaskError::ParseError(format!("malformed ErrorMessage: {}", e)))?;
            let message = format!("{}: {}", reply.code, reply.message);
            if reply.recoverable {
                Err(TaskError::ProcessError(message))
            } else {
                Err(TaskError::ExecutionFailed(message))
            }
        }
        other => Err(TaskError::ParseError(format!(
            "unexpected {:?} reply from skill process",
            other
        ))),
    }
}

fn parse_envelope(text: &str) -> Result<ProtocolMessage<JsonValue>, TaskError> {
    serde_json::from_str(text)
        .map_err(|e| TaskError::ParseError(format!("reply is not a protocol message: {}", e)))
}
