//! Deployment and sync report artifacts.
//!
//! Every run produces a structured report enumerating exactly what was
//! created, updated, skipped as unchanged, and what failed with cause —
//! never a silent partial deployment. Reports serialize to pretty JSON for
//! the dashboard layer and render to markdown for humans.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::progression::ConfigurationWarning;

/// What happened to one entity during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityAction {
    Created,
    Updated,
    /// Content digest matched the last deployment; no API call was made.
    Unchanged,
    Failed,
    /// Not attempted because an entity it depends on failed.
    Skipped,
}

/// Per-entity deployment outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    /// Resource-map key, e.g. `"module:basics"`.
    pub key: String,
    pub action: EntityAction,
    pub remote_id: Option<i64>,
    pub error: Option<String>,
}

impl EntityOutcome {
    pub fn ok(key: impl Into<String>, action: EntityAction, remote_id: i64) -> Self {
        Self {
            key: key.into(),
            action,
            remote_id: Some(remote_id),
            error: None,
        }
    }

    pub fn unchanged(key: impl Into<String>, remote_id: i64) -> Self {
        Self::ok(key, EntityAction::Unchanged, remote_id)
    }

    pub fn failed(key: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            key: key.into(),
            action: EntityAction::Failed,
            remote_id: None,
            error: Some(error.to_string()),
        }
    }

    pub fn skipped(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            key: key.into(),
            action: EntityAction::Skipped,
            remote_id: None,
            error: Some(reason.to_string()),
        }
    }
}

/// Canonical deployment report artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub schema_version: String,
    /// Unique id for this run, for correlating logs with the artifact.
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub course_code: String,
    pub outcomes: Vec<EntityOutcome>,
    /// True when the run was cancelled between entities.
    pub aborted: bool,
}

impl DeploymentReport {
    pub fn new(course_code: impl Into<String>) -> Self {
        Self {
            schema_version: "1".to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            course_code: course_code.into(),
            outcomes: Vec::new(),
            aborted: false,
        }
    }

    pub fn count(&self, action: EntityAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    /// Number of mutating API outcomes (created + updated).
    pub fn mutations(&self) -> usize {
        self.count(EntityAction::Created) + self.count(EntityAction::Updated)
    }

    pub fn overall_success(&self) -> bool {
        !self.aborted && self.count(EntityAction::Failed) == 0
    }
}

/// Per-student sync outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSyncOutcome {
    pub student_id: i64,
    pub xp_total: u32,
    pub new_badges: Vec<String>,
    /// Whether the gradebook write landed this cycle.
    pub written: bool,
    pub error: Option<String>,
}

/// Canonical sync-cycle report artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub schema_version: String,
    /// Unique id for this cycle, for correlating logs with the artifact.
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub course_code: String,
    pub column_title: String,
    pub students: Vec<StudentSyncOutcome>,
    /// Students whose write-back exhausted retries; retried next cycle.
    pub requeued: Vec<i64>,
    pub warnings: Vec<ConfigurationWarning>,
    /// Set when the cycle was cancelled between students; unwritten
    /// students are simply re-evaluated next cycle.
    #[serde(default)]
    pub aborted: bool,
}

impl SyncReport {
    pub fn new(course_code: impl Into<String>, column_title: impl Into<String>) -> Self {
        Self {
            schema_version: "1".to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            course_code: course_code.into(),
            column_title: column_title.into(),
            students: Vec::new(),
            requeued: Vec::new(),
            warnings: Vec::new(),
            aborted: false,
        }
    }

    pub fn written_count(&self) -> usize {
        self.students.iter().filter(|s| s.written).count()
    }
}

/// Write any report artifact as pretty JSON.
pub fn write_report_json<T: Serialize>(path: &Path, artifact: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize report artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a deployment report for PR/terminal output.
pub fn render_deployment_md(report: &DeploymentReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Deployment Report — {}\n\n", report.course_code));
    out.push_str(&format!(
        "- created: {}\n- updated: {}\n- unchanged: {}\n- failed: {}\n- skipped: {}\n\n",
        report.count(EntityAction::Created),
        report.count(EntityAction::Updated),
        report.count(EntityAction::Unchanged),
        report.count(EntityAction::Failed),
        report.count(EntityAction::Skipped),
    ));

    if report.aborted {
        out.push_str("**Run aborted before completion.**\n\n");
    }

    let failures: Vec<&EntityOutcome> = report
        .outcomes
        .iter()
        .filter(|o| o.action == EntityAction::Failed)
        .collect();
    if !failures.is_empty() {
        out.push_str("## Failures\n");
        for outcome in failures {
            out.push_str(&format!(
                "- `{}`: {}\n",
                outcome.key,
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        out.push('\n');
    }
    out
}

/// Render a sync report for terminal output.
pub fn render_sync_md(report: &SyncReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Sync Report — {} ({})\n\n",
        report.course_code, report.column_title
    ));
    out.push_str(&format!(
        "- students written: {}/{}\n- requeued: {}\n\n",
        report.written_count(),
        report.students.len(),
        report.requeued.len(),
    ));

    if report.aborted {
        out.push_str("**Cycle aborted before completion.**\n\n");
    }

    if !report.warnings.is_empty() {
        out.push_str("## Configuration warnings\n");
        for warning in &report.warnings {
            out.push_str(&format!("- {}\n", warning));
        }
        out.push('\n');
    }

    if !report.requeued.is_empty() {
        out.push_str("## Requeued students\n");
        for student in &report.requeued {
            out.push_str(&format!("- {}\n", student));
        }
        out.push('\n');
    }
    out
}
