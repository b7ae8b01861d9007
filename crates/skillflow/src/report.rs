//! Rendering and writing finished runs.
//!
//! Reports are written as `<output_dir>/<workflow-name>-<YYYYMMDD-HHMMSS>.<ext>`.

use crate::coordinator::RunReport;
use crate::error::OrchestratorError;
use crate::task::AgentOutput;
use chrono::{DateTime, Utc};
use minijinja::{Environment, context};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const MARKDOWN_TEMPLATE: &str = r#"# {{ report.workflowName }}

- Workflow: `{{ report.workflowId }}`
- Status: **{{ report.status }}**
{%- set progress = report.progress %}
- Progress: {{ progress.completed }}/{{ progress.total }} ({{ progress.percentage }}%)
- Started: {{ report.startedAt }}
{%- if report.completedAt %}
- Finished: {{ report.completedAt }}
{%- endif %}
{% if sections %}
## Results
{% for section in sections %}
### {{ section.id }}

Status: {{ section.status }} | Quality: {{ section.quality }} | Time: {{ section.execution_ms }} ms
{%- if section.assumptions %}

Assumptions:
{% for item in section.assumptions %}
- {{ item }}
{%- endfor %}
{%- endif %}

```json
{{ section.data }}
```
{% endfor %}
{%- endif %}
{%- if report.skipped %}
## Skipped

{% for id in report.skipped %}
- {{ id }}
{%- endfor %}
{% endif %}
{%- if report.errors %}
## Errors

| Task | Code | Recoverable | Message |
|---|---|---|---|
{% for error in report.errors -%}
| {{ error.taskId }} | {{ error.code }} | {{ error.recoverable }} | {{ error.message }} |
{% endfor %}
{%- endif %}
"#;

/// Output format of a run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "md" | "markdown" => Ok(ReportFormat::Markdown),
            other => Err(format!(
                "unsupported report format '{}' (expected json or md)",
                other
            )),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Serialize)]
struct Section<'a> {
    id: &'a str,
    status: String,
    quality: String,
    execution_ms: u64,
    assumptions: &'a [String],
    data: String,
}

impl<'a> Section<'a> {
    fn new(id: &'a str, output: &'a AgentOutput) -> Self {
        Self {
            id,
            status: enum_name(&output.status),
            quality: enum_name(&output.metadata.data_quality),
            execution_ms: output.metadata.execution_time,
            assumptions: &output.metadata.markings.assumptions,
            data: serde_json::to_string_pretty(&output.data).unwrap_or_default(),
        }
    }
}

fn enum_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Renders `report` in `format`.
pub fn render(report: &RunReport, format: ReportFormat) -> Result<String, OrchestratorError> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Markdown => {
            let sections: Vec<Section<'_>> = report
                .completed
                .iter()
                .filter_map(|id| report.results.get(id).map(|output| Section::new(id, output)))
                .collect();

            let env = Environment::new();
            let template = env
                .template_from_str(MARKDOWN_TEMPLATE)
                .map_err(|e| OrchestratorError::Internal(format!("report template: {}", e)))?;
            template
                .render(context! { report => report, sections => sections })
                .map_err(|e| OrchestratorError::Internal(format!("failed to render report: {}", e)))
        }
    }
}

/// `<slug>-<YYYYMMDD-HHMMSS>.<ext>`
pub fn timestamped_file_name(name: &str, extension: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}.{}", slug(name), at.format("%Y%m%d-%H%M%S"), extension)
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "workflow".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Renders and writes `report` under `output_dir`, creating it if needed.
pub fn write_report(
    report: &RunReport,
    format: ReportFormat,
    output_dir: &Path,
) -> Result<PathBuf, OrchestratorError> {
    let body = render(report, format)?;
    let path = output_dir.join(timestamped_file_name(
        &report.workflow_name,
        format.extension(),
        report.completed_at.unwrap_or_else(Utc::now),
    ));
    write_file(&path, &body)?;
    info!(path = %path.display(), format = %format, "Report written");
    Ok(path)
}

/// Writes a standalone skill output as JSON under `output_dir`.
pub fn write_output(output: &AgentOutput, output_dir: &Path) -> Result<PathBuf, OrchestratorError> {
    let body = serde_json::to_string_pretty(output)?;
    let path = output_dir.join(timestamped_file_name(&output.task_id, "json", output.generated_at));
    write_file(&path, &body)?;
    info!(path = %path.display(), "Skill output written");
    Ok(path)
}

fn write_file(path: &Path, body: &str) -> Result<(), OrchestratorError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            OrchestratorError::Internal(format!("failed to create {}: {}", dir.display(), e))
        })?;
    }
    std::fs::write(path, body).map_err(|e| {
        OrchestratorError::Internal(format!("failed to write {}: {}", path.display(), e))
    })
}
