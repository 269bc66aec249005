//! Canvas REST API trait and wire types.
//!
//! [`CanvasApi`] is the single seam between the deployment/sync engine and
//! Canvas. The production implementation is
//! [`HttpCanvasClient`](crate::http::HttpCanvasClient); tests use
//! [`MemoryCanvas`](crate::fakes::MemoryCanvas), which records every
//! mutating call so idempotence can be asserted directly.
//!
//! All mutating operations are create-or-update pairs keyed by a remote
//! numeric id. The engine never deletes remote resources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CanvasResult;

/// Remote Canvas numeric id.
pub type RemoteId = i64;

/// Payload for creating or updating a course module shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePayload {
    pub name: String,
    /// 1-based position within the course.
    pub position: usize,
    pub published: bool,
}

/// Payload for creating or updating an assignment (quizzes deploy through
/// the same endpoint family with identical grading surface).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPayload {
    pub name: String,
    pub points_possible: f64,
    pub published: bool,
    /// `"assignment"` or `"quiz"`, recorded as a submission-type hint.
    pub kind: String,
}

/// Payload for a module item (page content or a link to an assignment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleItemPayload {
    pub title: String,
    /// Canvas content type: `"Page"`, `"Assignment"`.
    pub content_type: String,
    /// Remote id of the linked content, absent for inline pages.
    pub content_id: Option<RemoteId>,
    /// 1-based position within the module.
    pub position: usize,
}

/// Payload for a custom gradebook column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPayload {
    pub title: String,
    pub hidden: bool,
}

/// One submission row from the Canvas submission listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub user_id: RemoteId,
    /// Remote assignment id the submission belongs to.
    pub assignment_id: RemoteId,
    pub score: Option<f64>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Async seam over the Canvas REST endpoints the engine uses.
///
/// Guarantees expected of implementations:
/// - `create_*` returns the remote id of the new resource.
/// - `update_*` is a full replace of the mutable payload fields.
/// - Writing a column datum stores an absolute value; re-writing the same
///   value is a no-op from the gradebook's point of view.
#[async_trait]
pub trait CanvasApi: Send + Sync {
    async fn create_module(&self, course_id: RemoteId, payload: &ModulePayload)
        -> CanvasResult<RemoteId>;

    async fn update_module(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        payload: &ModulePayload,
    ) -> CanvasResult<()>;

    async fn create_assignment(
        &self,
        course_id: RemoteId,
        payload: &AssignmentPayload,
    ) -> CanvasResult<RemoteId>;

    async fn update_assignment(
        &self,
        course_id: RemoteId,
        assignment_id: RemoteId,
        payload: &AssignmentPayload,
    ) -> CanvasResult<()>;

    async fn create_module_item(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        payload: &ModuleItemPayload,
    ) -> CanvasResult<RemoteId>;

    async fn update_module_item(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        item_id: RemoteId,
        payload: &ModuleItemPayload,
    ) -> CanvasResult<()>;

    /// Wire prerequisite module ids onto a module. Cross-link phase only;
    /// every referenced module must already exist remotely.
    async fn set_module_prerequisites(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        prerequisite_ids: &[RemoteId],
    ) -> CanvasResult<()>;

    async fn create_gradebook_column(
        &self,
        course_id: RemoteId,
        payload: &ColumnPayload,
    ) -> CanvasResult<RemoteId>;

    /// Write an absolute value into a custom gradebook column cell.
    async fn put_column_datum(
        &self,
        course_id: RemoteId,
        column_id: RemoteId,
        user_id: RemoteId,
        content: &str,
    ) -> CanvasResult<()>;

    /// List all student submissions for the course (read-only).
    async fn list_submissions(&self, course_id: RemoteId) -> CanvasResult<Vec<Submission>>;
}
