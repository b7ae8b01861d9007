//! 'skillflow' - dependency-ordered orchestration of skill computations.
//!
//! A catalog of [`Task`]s is planned into a [`Workflow`] (a subset, a preset,
//! a single task or the whole catalog, topologically ordered), then executed
//! one task at a time by the [`ExecutionCoordinator`]. Each skill sees only
//! the outputs of the tasks it declares as dependencies. Run state is written
//! through a [`StateStore`] after every change, so an interrupted run can be
//! resumed without re-executing completed work.
//!
//! Textual outputs carry provenance markings (`[FROM_PLAN]`, `[SUGGESTED]`,
//! `[ASSUMED]`) that are validated before a result is accepted.
//!
//! ```rust,ignore
//! use skillflow::{
//!     ExecutionCoordinator, InMemoryStore, PlanRequest, TaskCatalog, TaskRegistry,
//!     WorkflowPlanner,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = TaskRegistry::new().with_skill(Arc::new(market_skill));
//! let workflow = WorkflowPlanner::new(TaskCatalog::from_registry(&registry))
//!     .plan(&PlanRequest::Full)?;
//!
//! let report = ExecutionCoordinator::new(registry, Arc::new(InMemoryStore::new()))
//!     .run(&workflow, serde_json::Map::new(), CancellationToken::new())
//!     .await?;
//! assert!(report.is_success());
//! ```

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod planner;
pub mod process;
pub mod protocol;
pub mod provenance;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod state;
pub mod task;

pub use catalog::TaskCatalog;
pub use config::SkillflowConfig;
pub use coordinator::{
    CoordinatorConfig, ExecutionCoordinator, ExecutionObserver, FailurePolicy, RunReport,
    TracingObserver,
};
pub use error::{OrchestratorError, TaskError};
pub use metrics::MetricsProvider;
pub use planner::{PlanRequest, Workflow, WorkflowPlanner};
pub use process::ProcessSkill;
pub use protocol::{ProtocolMessage, RetryPolicy};
pub use registry::TaskRegistry;
pub use report::ReportFormat;
pub use resolver::{DependencyGraph, resolve_dependencies, topological_sort};
pub use session::RunManifest;
pub use state::{
    ExecutionError, InMemoryStore, JsonFileStore, Progress, RunStatus, StatePersistence,
    StateStore,
};
pub use task::{AgentOutput, Skill, SkillContext, SkillInput, Task};
