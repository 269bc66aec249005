//! Structured observability hooks for deployment and sync lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `DeploySpan`/`SyncSpan` RAII guards
//! - Emission functions for key lifecycle events: deploy start/finish,
//!   per-entity outcomes, sync cycle start/finish
//!
//! Events are emitted at `info!` level. For JSON output, pass `json = true`
//! to [`init_tracing`](crate::telemetry::init_tracing).

use tracing::info;

use crate::report::{EntityAction, EntityOutcome};

/// RAII guard that enters a deployment-scoped tracing span.
pub struct DeploySpan {
    _span: tracing::span::EnteredSpan,
}

impl DeploySpan {
    /// Create and enter a span tagged with the course code.
    pub fn enter(course_code: &str) -> Self {
        let span = tracing::info_span!("questline.deploy", course = %course_code);
        Self {
            _span: span.entered(),
        }
    }
}

/// RAII guard that enters a sync-cycle tracing span.
pub struct SyncSpan {
    _span: tracing::span::EnteredSpan,
}

impl SyncSpan {
    pub fn enter(course_code: &str) -> Self {
        let span = tracing::info_span!("questline.sync", course = %course_code);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: deployment started with module count.
pub fn emit_deploy_started(course_code: &str, modules: usize) {
    info!(event = "deploy.started", course = %course_code, modules = modules);
}

/// Emit event: one entity resolved (created/updated/unchanged/failed/skipped).
pub fn emit_entity_outcome(outcome: &EntityOutcome) {
    match outcome.action {
        EntityAction::Failed => tracing::warn!(
            event = "deploy.entity",
            key = %outcome.key,
            action = ?outcome.action,
            error = outcome.error.as_deref().unwrap_or(""),
        ),
        _ => info!(
            event = "deploy.entity",
            key = %outcome.key,
            action = ?outcome.action,
            remote_id = outcome.remote_id,
        ),
    }
}

/// Emit event: deployment finished with mutation and failure counts.
pub fn emit_deploy_finished(course_code: &str, mutations: usize, failed: usize, aborted: bool) {
    info!(
        event = "deploy.finished",
        course = %course_code,
        mutations = mutations,
        failed = failed,
        aborted = aborted,
    );
}

/// Emit event: sync cycle started with submission count.
pub fn emit_sync_started(course_code: &str, submissions: usize) {
    info!(event = "sync.started", course = %course_code, submissions = submissions);
}

/// Emit event: sync cycle finished with write and requeue counts.
pub fn emit_sync_finished(course_code: &str, written: usize, requeued: usize) {
    info!(
        event = "sync.finished",
        course = %course_code,
        written = written,
        requeued = requeued,
    );
}
