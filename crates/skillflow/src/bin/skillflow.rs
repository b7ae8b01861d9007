use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value as JsonValue};
use skillflow::observability::{self, LogTarget, ObservabilityConfig};
use skillflow::report::{self, ReportFormat};
use skillflow::session;
use skillflow::{
    ExecutionCoordinator, JsonFileStore, PlanRequest, RunReport, SkillflowConfig, TaskRegistry,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

const DEFAULT_CONFIG_FILE: &str = "skillflow.json";

/// Dependency-ordered skill orchestration
#[derive(Parser, Debug)]
#[command(name = "skillflow")]
#[command(about = "Plan and run dependency-ordered skill workflows")]
#[command(version)]
struct Cli {
    /// Configuration file. Defaults to ./skillflow.json when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level for skillflow events (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a workflow, run it and write a timestamped report
    Orchestrate {
        /// Run the full catalog with this research brief as input
        #[arg(long, value_name = "FILE", conflicts_with_all = ["refactor", "workflow"])]
        research: Option<PathBuf>,

        /// Run only the refactor task against this file
        #[arg(long, value_name = "FILE", conflicts_with = "workflow")]
        refactor: Option<PathBuf>,

        /// Run a named preset
        #[arg(long, value_name = "PRESET")]
        workflow: Option<String>,

        /// Input data for --workflow or the default full run
        #[arg(long, value_name = "FILE", conflicts_with_all = ["research", "refactor"])]
        input: Option<PathBuf>,

        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Report format: json or md
        #[arg(long, default_value = "json")]
        format: ReportFormat,
    },

    /// Continue a persisted run, skipping completed tasks
    Resume {
        #[arg(long, value_name = "ID")]
        workflow_id: String,

        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        #[arg(long, default_value = "json")]
        format: ReportFormat,
    },

    /// Run exactly one skill with an empty context
    RunSkill {
        #[arg(long, value_name = "ID")]
        skill: String,

        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Print registered skills and presets
    ListSkills {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let logging = match init_logging(&level, cli.log_file.clone(), cli.log_json) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("warning: logging disabled: {}", e);
            false
        }
    };

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) if logging => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, file: Option<String>, json: bool) -> Result<()> {
    let mut config = ObservabilityConfig::default()
        .with_level_str(level)
        .map_err(anyhow::Error::msg)?
        .with_json(json);
    if let Some(path) = file {
        config = config.with_target(LogTarget::File(path));
    }
    observability::init(config).map_err(|e| anyhow::anyhow!("{}", e))
}

fn load_config(path: Option<&Path>) -> Result<SkillflowConfig> {
    match path {
        Some(path) => Ok(SkillflowConfig::load(path)?),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Ok(SkillflowConfig::load(DEFAULT_CONFIG_FILE)?)
        }
        None => Ok(SkillflowConfig::default()),
    }
}

async fn run(command: Command, mut config: SkillflowConfig) -> Result<ExitCode> {
    match command {
        Command::Orchestrate {
            research,
            refactor,
            workflow,
            input,
            output_dir,
            format,
        } => {
            if let Some(dir) = output_dir {
                config = config.with_output_dir(dir);
            }
            let (request, data) = match (research, refactor, workflow) {
                (Some(path), _, _) => (PlanRequest::Full, read_input(&path, "research")?),
                (_, Some(path), _) => (
                    PlanRequest::Single(config.refactor_task.clone()),
                    read_input(&path, "source")?,
                ),
                (_, _, Some(preset)) => (PlanRequest::Preset(preset), optional_input(input)?),
                (None, None, None) => (PlanRequest::Full, optional_input(input)?),
            };
            orchestrate(&config, &request, data, format).await
        }
        Command::Resume {
            workflow_id,
            output_dir,
            format,
        } => {
            if let Some(dir) = output_dir {
                config = config.with_output_dir(dir);
            }
            resume(&config, &workflow_id, format).await
        }
        Command::RunSkill {
            skill,
            input,
            output_dir,
        } => {
            if let Some(dir) = output_dir {
                config = config.with_output_dir(dir);
            }
            run_skill(&config, &skill, &input).await
        }
        Command::ListSkills { json } => {
            list_skills(&config, json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn orchestrate(
    config: &SkillflowConfig,
    request: &PlanRequest,
    data: Map<String, JsonValue>,
    format: ReportFormat,
) -> Result<ExitCode> {
    let report = session::orchestrate(
        &config.planner(),
        &coordinator(config)?,
        &config.state_dir(),
        request,
        data,
        shutdown_token(),
    )
    .await
    .context("workflow orchestration failed")?;

    finish(config, &report, format)
}

async fn resume(
    config: &SkillflowConfig,
    workflow_id: &str,
    format: ReportFormat,
) -> Result<ExitCode> {
    let report = session::resume(
        &coordinator(config)?,
        &config.state_dir(),
        workflow_id,
        shutdown_token(),
    )
    .await
    .with_context(|| format!("failed to resume workflow '{}'", workflow_id))?;

    finish(config, &report, format)
}

fn finish(config: &SkillflowConfig, report: &RunReport, format: ReportFormat) -> Result<ExitCode> {
    let path = report::write_report(report, format, &config.output_dir)
        .context("failed to write report")?;
    println!("{}", path.display());

    if !report.is_success() {
        warn!(
            workflow_id = %report.workflow_id,
            failed = report.errors.len(),
            skipped = report.skipped.len(),
            "Workflow finished with failures; resume with `skillflow resume --workflow-id {}`",
            report.workflow_id
        );
    }
    Ok(session::exit_code(report))
}

async fn run_skill(config: &SkillflowConfig, skill: &str, input: &Path) -> Result<ExitCode> {
    let data = read_input(input, "input")?;
    let coordinator = coordinator(config)?;
    let output = coordinator
        .run_standalone(skill, data, shutdown_token())
        .await
        .with_context(|| format!("skill '{}' failed", skill))?;

    let path = report::write_output(&output, &config.output_dir)
        .context("failed to write skill output")?;
    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn list_skills(config: &SkillflowConfig, json: bool) -> Result<()> {
    let registry = config.process_registry()?;
    let catalog = config.task_catalog();

    if json {
        let listing = serde_json::json!({
            "skills": registry.capabilities(),
            "presets": catalog.presets(),
            "health": coordinator(config)?.health_check().payload,
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for task in catalog.tasks() {
        let marker = if registry.contains(&task.id) { "" } else { " (no command)" };
        if task.dependencies.is_empty() {
            println!("{:<12} {}{}", task.id, task.name, marker);
        } else {
            println!(
                "{:<12} {}{}  <- {}",
                task.id,
                task.name,
                marker,
                task.dependencies.join(", ")
            );
        }
    }
    for (name, ids) in catalog.presets() {
        println!("preset {}: {}", name, ids.join(", "));
    }
    Ok(())
}

fn coordinator(config: &SkillflowConfig) -> Result<ExecutionCoordinator> {
    let registry: TaskRegistry = config.process_registry()?;
    let persistence = Arc::new(JsonFileStore::new(config.state_dir()));
    Ok(ExecutionCoordinator::new(registry, persistence).with_config(config.coordinator_config()))
}

/// Token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            child.cancel();
        }
    });
    token
}

/// A JSON object file is used as the input map; anything else is passed as
/// text under `key`.
fn read_input(path: &Path, key: &str) -> Result<Map<String, JsonValue>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    match serde_json::from_str::<JsonValue>(&contents) {
        Ok(JsonValue::Object(map)) => Ok(map),
        _ => {
            let mut map = Map::new();
            map.insert(key.to_string(), JsonValue::String(contents));
            map.insert(
                "sourcePath".to_string(),
                JsonValue::String(path.display().to_string()),
            );
            Ok(map)
        }
    }
}

fn optional_input(path: Option<PathBuf>) -> Result<Map<String, JsonValue>> {
    match path {
        Some(path) => read_input(&path, "input"),
        None => Ok(Map::new()),
    }
}
