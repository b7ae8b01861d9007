//! Plan, persist and resume runs the way the `skillflow` binary does,
//! against a real state directory.

use async_trait::async_trait;
use serde_json::{Map, json};
use skillflow::session::{self, RunManifest};
use skillflow::{
    AgentOutput, CoordinatorConfig, ExecutionCoordinator, FailurePolicy, JsonFileStore,
    OrchestratorError, PlanRequest, RunStatus, Skill, SkillInput, StatePersistence, Task,
    TaskCatalog, TaskError, TaskRegistry, Workflow, WorkflowPlanner,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Fails while `broken` is set. Records call count and the input keys it saw.
#[derive(Clone)]
struct SwitchSkill {
    task: Task,
    broken: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    data_keys: Arc<Mutex<Vec<String>>>,
}

impl SwitchSkill {
    fn new(task: Task) -> Self {
        Self {
            task,
            broken: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
            data_keys: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn broken(self) -> Self {
        self.broken.store(true, Ordering::SeqCst);
        self
    }

    fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Skill for SwitchSkill {
    fn identity(&self) -> &Task {
        &self.task
    }

    async fn execute(&self, input: SkillInput) -> Result<AgentOutput, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.data_keys.lock().unwrap() = input.data.keys().cloned().collect();

        if self.broken.load(Ordering::SeqCst) {
            return Err(TaskError::ExecutionFailed(format!("{} is misconfigured", self.task.id)));
        }
        Ok(AgentOutput::success(
            &self.task.id,
            json!({"summary": format!("[FROM_PLAN] {}", self.task.name)}),
        ))
    }
}

fn planner(skills: &[&SwitchSkill]) -> WorkflowPlanner {
    WorkflowPlanner::new(TaskCatalog::new(skills.iter().map(|s| s.task.clone()).collect()))
}

fn coordinator(
    skills: &[&SwitchSkill],
    state_dir: &Path,
    policy: FailurePolicy,
) -> ExecutionCoordinator {
    let registry = skills.iter().fold(TaskRegistry::new(), |registry, skill| {
        registry.with_skill(Arc::new((*skill).clone()))
    });
    ExecutionCoordinator::new(registry, Arc::new(JsonFileStore::new(state_dir)))
        .with_config(CoordinatorConfig::new().with_failure_policy(policy))
}

fn research_input() -> Map<String, serde_json::Value> {
    let mut data = Map::new();
    data.insert("research".into(), json!("coffee subscription brief"));
    data
}

#[tokio::test]
async fn test_completed_run_exits_successfully() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let intake = SwitchSkill::new(Task::new("01", "Intake"));
    let market = SwitchSkill::new(Task::new("05", "Market").with_dependencies(["01"]));
    let skills = [&intake, &market];

    let report = session::orchestrate(
        &planner(&skills),
        &coordinator(&skills, &state_dir, FailurePolicy::ContinueIndependent),
        &state_dir,
        &PlanRequest::Full,
        research_input(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(session::exit_code(&report), ExitCode::SUCCESS);

    assert!(RunManifest::path(&state_dir, &report.workflow_id).exists());
    assert!(JsonFileStore::new(&state_dir).path_for(&report.workflow_id).exists());
    let manifest = RunManifest::load(&state_dir, &report.workflow_id).unwrap();
    assert_eq!(manifest.workflow.task_ids(), ["01", "05"]);
    assert_eq!(manifest.data, research_input());
}

#[tokio::test]
async fn test_failed_run_exits_with_failure_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let intake = SwitchSkill::new(Task::new("01", "Intake"));
    let market = SwitchSkill::new(Task::new("05", "Market").with_dependencies(["01"])).broken();
    let financials = SwitchSkill::new(Task::new("06", "Financials").with_dependencies(["05"]));
    let skills = [&intake, &market, &financials];
    let coordinator = coordinator(&skills, &state_dir, FailurePolicy::ContinueIndependent);

    let first = session::orchestrate(
        &planner(&skills),
        &coordinator,
        &state_dir,
        &PlanRequest::Full,
        research_input(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.skipped, vec!["06"]);
    assert_eq!(session::exit_code(&first), ExitCode::FAILURE);

    market.repair();
    let second = session::resume(
        &coordinator,
        &state_dir,
        &first.workflow_id,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(intake.calls(), 1);
    assert_eq!(market.calls(), 2);
    assert_eq!(financials.calls(), 1);
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.completed, vec!["01", "05", "06"]);
    assert_eq!(session::exit_code(&second), ExitCode::SUCCESS);
    // The saved input is handed back on resume.
    assert_eq!(*financials.data_keys.lock().unwrap(), vec!["research"]);
}

#[tokio::test]
async fn test_fail_fast_run_resumes_where_it_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let a = SwitchSkill::new(Task::new("A", "A"));
    let b = SwitchSkill::new(Task::new("B", "B")).broken();
    let c = SwitchSkill::new(Task::new("C", "C"));
    let skills = [&a, &b, &c];
    let coordinator = coordinator(&skills, &state_dir, FailurePolicy::FailFast);

    let first = session::orchestrate(
        &planner(&skills),
        &coordinator,
        &state_dir,
        &PlanRequest::Full,
        Map::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(first.completed, vec!["A"]);
    assert_eq!(first.skipped, vec!["C"]);
    assert_eq!(c.calls(), 0);
    assert_eq!(session::exit_code(&first), ExitCode::FAILURE);
    let persisted = JsonFileStore::new(&state_dir)
        .load(&first.workflow_id)
        .unwrap()
        .unwrap();
    assert_eq!(persisted.status, RunStatus::Failed);

    b.repair();
    let second = session::resume(
        &coordinator,
        &state_dir,
        &first.workflow_id,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 2, 1));
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.completed, vec!["A", "B", "C"]);
    assert_eq!(second.errors.len(), 1, "first attempt's error is kept");
    assert_eq!(session::exit_code(&second), ExitCode::SUCCESS);
}

#[tokio::test]
async fn test_plan_error_is_returned_before_anything_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let intake = SwitchSkill::new(Task::new("01", "Intake"));
    let skills = [&intake];

    let err = session::orchestrate(
        &planner(&skills),
        &coordinator(&skills, &state_dir, FailurePolicy::ContinueIndependent),
        &state_dir,
        &PlanRequest::Preset("marketing-only".into()),
        Map::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::PresetNotFound { ref name, .. } if name == "marketing-only"
    ));
    assert!(!state_dir.exists());
    assert_eq!(intake.calls(), 0);
}

#[tokio::test]
async fn test_resume_never_reads_outside_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let intake = SwitchSkill::new(Task::new("01", "Intake"));
    let skills = [&intake];

    // A manifest one level above the state directory.
    let workflow = planner(&skills).plan(&PlanRequest::Full).unwrap();
    let stray = RunManifest::new(
        Workflow {
            id: "escape".into(),
            ..workflow
        },
        Map::new(),
    );
    stray.save(dir.path()).unwrap();

    let err = session::resume(
        &coordinator(&skills, &state_dir, FailurePolicy::ContinueIndependent),
        &state_dir,
        "../escape",
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "INVALID_INPUT");
    assert_eq!(intake.calls(), 0);
}
