//! Gradebook write-back: XP totals into one custom gradebook column.
//!
//! Writes are absolute values, so a replayed write is harmless and a lost
//! report never corrupts the column. Per-student writes fan out with bounded
//! concurrency and share the run's rate-limit budget.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::debug;

use questline_canvas::{
    CanvasApi, CanvasError, ColumnPayload, ContentDigest, RateLimitBudget, RemoteId, ResourceMap,
    ResourceMapStore, RetryPolicy,
};

use crate::error::Result;
use crate::sync::deployer::CancelFlag;

/// Default fan-out for per-student column writes.
pub const DEFAULT_MAX_WORKERS: usize = 4;

pub struct GradebookWriter<'a> {
    api: &'a dyn CanvasApi,
    course_id: RemoteId,
    policy: RetryPolicy,
    budget: Arc<RateLimitBudget>,
    max_workers: usize,
    cancel: CancelFlag,
}

impl<'a> GradebookWriter<'a> {
    pub fn new(api: &'a dyn CanvasApi, course_id: RemoteId) -> Self {
        Self {
            api,
            course_id,
            policy: RetryPolicy::default(),
            budget: Arc::new(RateLimitBudget::default()),
            max_workers: DEFAULT_MAX_WORKERS,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_budget(mut self, budget: Arc<RateLimitBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ensure the XP column exists, creating it on first use and recording
    /// it in the resource map under `gradebook:<title>`.
    pub async fn ensure_column(
        &self,
        title: &str,
        map: &mut ResourceMap,
        store: &dyn ResourceMapStore,
    ) -> Result<RemoteId> {
        let key = format!("gradebook:{title}");
        if let Some(id) = map.remote_id(&key) {
            return Ok(id);
        }
        let payload = ColumnPayload {
            title: title.to_string(),
            hidden: false,
        };
        let id = self
            .policy
            .execute(&self.budget, || {
                self.api.create_gradebook_column(self.course_id, &payload)
            })
            .await?;
        let digest = ContentDigest::from_bytes(&serde_json::to_vec(&payload)?);
        map.record(&key, id, digest);
        store.persist(map)?;
        Ok(id)
    }

    /// Write one absolute XP value per student. Results come back per
    /// student; a failure never aborts the batch. Cancellation stops new
    /// writes from being issued; students not yet started are silently
    /// omitted from the results and picked up next cycle.
    pub async fn write_all(
        &self,
        column_id: RemoteId,
        totals: &[(RemoteId, u32)],
    ) -> Vec<(RemoteId, std::result::Result<(), CanvasError>)> {
        let mut results: Vec<(RemoteId, std::result::Result<(), CanvasError>)> =
            stream::iter(totals.iter().copied())
                .map(|(user_id, xp)| async move {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let content = xp.to_string();
                    let result = self
                        .policy
                        .execute(&self.budget, || {
                            self.api
                                .put_column_datum(self.course_id, column_id, user_id, &content)
                        })
                        .await;
                    debug!(user_id, xp, ok = result.is_ok(), "column write");
                    Some((user_id, result))
                })
                .buffer_unordered(self.max_workers)
                .filter_map(|entry| async move { entry })
                .collect()
                .await;
        results.sort_by_key(|(user_id, _)| *user_id);
        results
    }
}
