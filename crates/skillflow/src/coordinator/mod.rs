//! Sequential execution of a planned [`Workflow`].
//!
//! The coordinator walks the workflow in its (already topologically valid)
//! order. For each task it:
//!
//! 1. looks the skill up in the [`TaskRegistry`]
//! 2. assembles the input context from the outputs of the task's declared
//!    dependencies only
//! 3. invokes the skill under the configured retry policy, timeout and
//!    cancellation token
//! 4. validates provenance markings and writes the result or error through
//!    the [`StateStore`]
//!
//! What happens after a failure is decided by [`FailurePolicy`].

mod config;
mod observer;

pub use config::{CoordinatorConfig, FailurePolicy};
pub use observer::{ExecutionObserver, TracingObserver};

use crate::error::OrchestratorError;
use crate::metrics::{self, MetricsProvider};
use crate::planner::Workflow;
use crate::protocol::{
    ErrorMessage, HealthCheck, ProtocolMessage, StatusUpdate, TaskPhase, TaskRequest,
    TaskResponse,
};
use crate::provenance;
use crate::registry::TaskRegistry;
use crate::resolver::DependencyGraph;
use crate::retry::retry_execution;
use crate::state::{
    ExecutionError, ExecutionState, Progress, RunStatus, StatePersistence, StateStore,
};
use crate::task::{AgentOutput, OutputStatus, Skill, SkillContext, SkillInput, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Workflow id reported for standalone skill executions.
pub const STANDALONE_WORKFLOW_ID: &str = "standalone";

/// Outcome of [`ExecutionCoordinator::run`] or [`ExecutionCoordinator::resume`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Completed task ids, in workflow order.
    pub completed: Vec<String>,
    /// Task ids never executed, in workflow order.
    pub skipped: Vec<String>,
    pub errors: Vec<ExecutionError>,
    pub progress: Progress,
    pub results: BTreeMap<String, AgentOutput>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    fn from_state(workflow: &Workflow, state: &ExecutionState, skipped: &HashSet<String>) -> Self {
        let ids = |keep: &dyn Fn(&str) -> bool| -> Vec<String> {
            workflow
                .tasks
                .iter()
                .filter(|t| keep(&t.id))
                .map(|t| t.id.clone())
                .collect()
        };
        let completed = ids(&|id: &str| state.is_completed(id));
        let skipped = ids(&|id: &str| skipped.contains(id));

        Self {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            status: state.status,
            started_at: state.started_at,
            completed_at: state.completed_at,
            completed,
            skipped,
            errors: state.errors.clone(),
            progress: state.progress,
            results: workflow
                .tasks
                .iter()
                .filter_map(|t| state.results.get(&t.id).map(|o| (t.id.clone(), o.clone())))
                .collect(),
        }
    }
}

/// Drives a workflow to completion or failure, one task at a time.
pub struct ExecutionCoordinator {
    registry: TaskRegistry,
    persistence: Arc<dyn StatePersistence>,
    config: CoordinatorConfig,
    observer: Arc<dyn ExecutionObserver>,
    metrics: Option<Arc<dyn MetricsProvider>>,
}

impl ExecutionCoordinator {
    pub fn new(registry: TaskRegistry, persistence: Arc<dyn StatePersistence>) -> Self {
        Self {
            registry,
            persistence,
            config: CoordinatorConfig::default(),
            observer: Arc::new(TracingObserver),
            metrics: None,
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_metrics(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(provider);
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Healthy once at least one skill is registered.
    pub fn health_check(&self) -> ProtocolMessage<HealthCheck> {
        ProtocolMessage::new(HealthCheck {
            component: "coordinator".to_string(),
            healthy: !self.registry.is_empty(),
            details: Some(format!(
                "{} skill(s) registered, metrics {}",
                self.registry.len(),
                if self.metrics.is_some() { "on" } else { "off" }
            )),
        })
    }

    /// Executes `workflow` from the beginning.
    ///
    /// Task failures are recorded in the report, not returned as errors.
    ///
    /// # Errors
    ///
    /// - `TaskNotFound` if a workflow task has no registered skill (checked
    ///   before anything runs)
    /// - any persistence failure, which aborts the run
    pub async fn run(
        &self,
        workflow: &Workflow,
        data: Map<String, JsonValue>,
        cancellation_token: CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        self.ensure_registered(workflow)?;

        let mut store = StateStore::new(&workflow.id, Arc::clone(&self.persistence));
        store.start(workflow.len())?;

        self.drive(workflow, &data, store, cancellation_token)
            .instrument(info_span!(
                "workflow_run",
                workflow_id = %workflow.id,
                total_tasks = workflow.len(),
                resumed = false,
            ))
            .await
    }

    /// Continues a previously persisted run of `workflow`.
    ///
    /// Completed tasks keep their results and are not re-run. Recorded errors
    /// are retained.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if no state was ever persisted for `workflow.id`, plus
    /// everything [`run`](Self::run) can return.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        data: Map<String, JsonValue>,
        cancellation_token: CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        self.ensure_registered(workflow)?;

        let mut store = StateStore::load_state(&workflow.id, Arc::clone(&self.persistence))?
            .ok_or_else(|| {
                OrchestratorError::InvalidInput(format!(
                    "no persisted state for workflow '{}'",
                    workflow.id
                ))
            })?;
        store.resume(workflow.len())?;

        self.drive(workflow, &data, store, cancellation_token)
            .instrument(info_span!(
                "workflow_run",
                workflow_id = %workflow.id,
                total_tasks = workflow.len(),
                resumed = true,
            ))
            .await
    }

    /// Runs one registered skill with an empty context and no state file.
    pub async fn run_standalone(
        &self,
        task_id: &str,
        data: Map<String, JsonValue>,
        cancellation_token: CancellationToken,
    ) -> Result<AgentOutput, OrchestratorError> {
        let skill = self.registry.get(task_id)?;
        let input = SkillInput::new(data);

        async {
            let result = self
                .call_skill(
                    STANDALONE_WORKFLOW_ID,
                    skill,
                    input,
                    Progress::new(0, 1),
                    &cancellation_token,
                )
                .await;
            self.report_outcome(task_id, &result);
            result
        }
        .instrument(info_span!("task", task_id = %task_id, standalone = true))
        .await
    }

    fn ensure_registered(&self, workflow: &Workflow) -> Result<(), OrchestratorError> {
        match workflow.tasks.iter().find(|t| !self.registry.contains(&t.id)) {
            Some(missing) => Err(OrchestratorError::task_not_found(
                &missing.id,
                self.registry.ids(),
            )),
            None => Ok(()),
        }
    }

    /// Runs the loop and marks the persisted run `failed` if it aborts.
    async fn drive(
        &self,
        workflow: &Workflow,
        data: &Map<String, JsonValue>,
        mut store: StateStore,
        cancellation_token: CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        match self
            .drive_tasks(workflow, data, &mut store, &cancellation_token)
            .await
        {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(error = %err, "Workflow run aborted");
                if let Err(fail_err) = store.fail() {
                    warn!(error = %fail_err, "Could not mark aborted run as failed");
                }
                Err(err)
            }
        }
    }

    async fn drive_tasks(
        &self,
        workflow: &Workflow,
        data: &Map<String, JsonValue>,
        store: &mut StateStore,
        cancellation_token: &CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        let graph = DependencyGraph::from_tasks(&workflow.tasks);
        let mut skipped: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut executed_any = false;
        let mut halted = false;

        info!(
            policy = ?self.config.failure_policy,
            already_completed = store.progress().completed,
            "Starting workflow run"
        );

        for task in &workflow.tasks {
            if store.state().is_completed(&task.id) {
                debug!(task_id = %task.id, "Task already completed, not re-running");
                continue;
            }
            if skipped.contains(&task.id) {
                continue;
            }

            if executed_any && !self.config.min_task_interval.is_zero() {
                debug!(interval = ?self.config.min_task_interval, "Waiting before next task");
                let cancelled = tokio::select! {
                    biased;
                    _ = cancellation_token.cancelled() => true,
                    _ = tokio::time::sleep(self.config.min_task_interval) => false,
                };
                if cancelled {
                    warn!(next_task = %task.id, "Run cancelled between tasks");
                    halted = true;
                    break;
                }
            }
            executed_any = true;

            store.set_current_task(&task.id)?;
            let outcome = self
                .invoke(workflow, task, data, store, cancellation_token)
                .instrument(info_span!("task", task_id = %task.id, name = %task.name))
                .await;
            self.report_outcome(&task.id, &outcome);

            match outcome {
                Ok(output) => {
                    store.save_result(&task.id, output)?;
                    self.emit_status(
                        &workflow.id,
                        &task.id,
                        TaskPhase::Completed,
                        store.progress(),
                        None,
                    );
                }
                Err(err) if err.is_internal() => return Err(err),
                Err(err) => {
                    store.record_error(ExecutionError::from_error(&task.id, &err))?;
                    failed.insert(task.id.clone());
                    self.emit_status(
                        &workflow.id,
                        &task.id,
                        TaskPhase::Failed,
                        store.progress(),
                        Some(err.to_string()),
                    );

                    let cancelled = matches!(err, OrchestratorError::Cancelled { .. });
                    if cancelled || self.config.failure_policy == FailurePolicy::FailFast {
                        warn!(task_id = %task.id, cancelled, "Stopping workflow run");
                        halted = true;
                        break;
                    }

                    let dependents = graph.transitive_dependents(&task.id);
                    for downstream in workflow.tasks.iter().filter(|t| dependents.contains(&t.id)) {
                        if store.state().is_completed(&downstream.id)
                            || !skipped.insert(downstream.id.clone())
                        {
                            continue;
                        }
                        debug!(
                            task_id = %downstream.id,
                            failed_dependency = %task.id,
                            "Task skipped due to failed dependency"
                        );
                        self.emit_status(
                            &workflow.id,
                            &downstream.id,
                            TaskPhase::Skipped,
                            store.progress(),
                            Some(format!("dependency '{}' failed", task.id)),
                        );
                    }
                }
            }
        }

        if halted {
            for task in &workflow.tasks {
                if store.state().is_completed(&task.id) || failed.contains(&task.id) {
                    continue;
                }
                if skipped.insert(task.id.clone()) {
                    self.emit_status(
                        &workflow.id,
                        &task.id,
                        TaskPhase::Skipped,
                        store.progress(),
                        Some("run stopped".to_string()),
                    );
                }
            }
        }

        if workflow.tasks.iter().all(|t| store.state().is_completed(&t.id)) {
            store.complete()?;
        } else {
            store.fail()?;
        }

        let report = RunReport::from_state(workflow, store.state(), &skipped);
        info!(
            status = %report.status,
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            percentage = report.progress.percentage,
            "Workflow run finished"
        );
        Ok(report)
    }

    async fn invoke(
        &self,
        workflow: &Workflow,
        task: &Task,
        data: &Map<String, JsonValue>,
        store: &StateStore,
        cancellation_token: &CancellationToken,
    ) -> Result<AgentOutput, OrchestratorError> {
        let skill = self.registry.get(&task.id)?;
        let progress = store.progress();

        let mut completed: Vec<&String> = store.state().completed_tasks.iter().collect();
        completed.sort();
        let execution_state = json!({
            "workflowId": workflow.id,
            "currentTask": task.id,
            "completedTasks": completed,
            "progress": progress,
            "metrics": metrics::collect(self.metrics.as_deref(), &workflow.id).await,
        });

        let input = SkillInput {
            data: data.clone(),
            context: SkillContext {
                previous_outputs: store.get_context(&task.dependencies),
                execution_state,
            },
        };

        self.emit_status(&workflow.id, &task.id, TaskPhase::Started, progress, None);
        self.call_skill(&workflow.id, skill, input, progress, cancellation_token)
            .await
    }

    /// Retry loop raced against the timeout and the cancellation token, then
    /// output checks.
    async fn call_skill(
        &self,
        workflow_id: &str,
        skill: Arc<dyn Skill>,
        input: SkillInput,
        progress: Progress,
        cancellation_token: &CancellationToken,
    ) -> Result<AgentOutput, OrchestratorError> {
        let task_id = skill.id().to_string();
        let dependency_ids: Vec<String> = input.context.previous_outputs.keys().cloned().collect();

        self.observer.on_request(&ProtocolMessage::new(TaskRequest {
            task_id: task_id.clone(),
            input: input.clone(),
            timeout_ms: self.config.task_timeout.map(crate::protocol::duration_ms),
            retry_policy: Some(self.config.retry),
        }));

        let started = Instant::now();
        let attempts = retry_execution(
            &self.config.retry,
            &input,
            |attempt, error, delay| {
                self.emit_status(
                    workflow_id,
                    &task_id,
                    TaskPhase::Retrying,
                    progress,
                    Some(format!("retry {} in {:?} after: {}", attempt, delay, error)),
                )
            },
            |input| {
                let skill = Arc::clone(&skill);
                async move { skill.execute(input).await }
            },
        );

        let guarded = async {
            match self.config.task_timeout {
                Some(limit) => tokio::time::timeout(limit, attempts).await.map_err(|_| {
                    warn!(task_id = %task_id, timeout = ?limit, "Task execution timed out");
                    OrchestratorError::Timeout {
                        task_id: task_id.clone(),
                        timeout: limit,
                    }
                }),
                None => Ok(attempts.await),
            }
        };

        let (result, attempt_count) = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                warn!(task_id = %task_id, "Task cancelled");
                return Err(OrchestratorError::Cancelled { task_id: task_id.clone() });
            }
            outcome = guarded => outcome?,
        };

        let mut output = result.map_err(|e| OrchestratorError::from_task_error(&task_id, e))?;

        if output.status == OutputStatus::Failed {
            return Err(OrchestratorError::ExecutionFailed {
                task_id,
                message: "skill reported status 'failed'".to_string(),
            });
        }

        provenance::validate(&output.data).map_err(|e| match e {
            OrchestratorError::InvalidProvenance(msg) => {
                OrchestratorError::InvalidProvenance(format!("task '{}': {}", task_id, msg))
            }
            other => other,
        })?;

        if output.task_id != task_id {
            warn!(
                reported = %output.task_id,
                task_id = %task_id,
                "Skill reported a different task id, using the registered one"
            );
            output.task_id = task_id.clone();
        }
        if output.metadata.execution_time == 0 {
            output.metadata.execution_time = crate::protocol::duration_ms(started.elapsed());
        }
        if output.metadata.dependencies_used.is_empty() {
            output.metadata.dependencies_used = dependency_ids;
        }

        debug!(task_id = %task_id, attempts = attempt_count, "Skill finished");
        Ok(output)
    }

    fn report_outcome(&self, task_id: &str, outcome: &Result<AgentOutput, OrchestratorError>) {
        match outcome {
            Ok(output) => self.observer.on_response(&ProtocolMessage::new(TaskResponse {
                task_id: task_id.to_string(),
                output: output.clone(),
            })),
            Err(err) => self
                .observer
                .on_error(&ProtocolMessage::new(ErrorMessage::from_error(task_id, err))),
        }
    }

    fn emit_status(
        &self,
        workflow_id: &str,
        task_id: &str,
        phase: TaskPhase,
        progress: Progress,
        message: Option<String>,
    ) {
        self.observer.on_status(&ProtocolMessage::new(StatusUpdate {
            workflow_id: workflow_id.to_string(),
            task_id: task_id.to_string(),
            phase,
            progress,
            message,
        }));
    }
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
