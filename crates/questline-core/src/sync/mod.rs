//! Synchronization engine: deployment, sync cycles, award bookkeeping.
//!
//! [`deployer`] pushes the content model into Canvas; [`gradebook`] writes
//! XP totals back. [`run_sync`] ties a full cycle together: pull
//! submissions, evaluate progression, score, persist awards, write the
//! gradebook column, and report.

pub mod deployer;
pub mod gradebook;
pub(crate) mod payloads;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use questline_canvas::{
    CanvasApi, CanvasError, RateLimitBudget, RemoteId, ResourceMap, ResourceMapStore, RetryPolicy,
    Submission,
};

use crate::error::Result;
use crate::model::{BadgeId, CourseDefinition, ItemId, ModuleId};
use crate::obs;
use crate::progression::{Evaluator, ItemProgress, SubmissionSet};
use crate::report::{StudentSyncOutcome, SyncReport};
use crate::scoring;
use crate::sync::deployer::{item_key, module_key, CancelFlag};
use crate::sync::gradebook::GradebookWriter;

/// Persistent record of which badges each student has already been awarded.
///
/// Awards are exactly-once: a badge enters this ledger the cycle it is
/// earned and never leaves, so later cycles report only genuinely new
/// badges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwardLedger {
    awards: HashMap<i64, BTreeSet<BadgeId>>,
}

impl AwardLedger {
    /// Load from a JSON file; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn awarded(&self, student_id: i64) -> HashSet<BadgeId> {
        self.awards
            .get(&student_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&mut self, student_id: i64, badges: impl IntoIterator<Item = BadgeId>) {
        self.awards.entry(student_id).or_default().extend(badges);
    }
}

/// Knobs for one sync cycle.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Gradebook column title the XP total lands in.
    pub column_title: String,
    /// Fan-out for per-student column writes.
    pub max_workers: usize,
    pub policy: RetryPolicy,
    /// Aborts the cycle between students; checked before the column is
    /// ensured, between evaluations, and before each column write.
    pub cancel: CancelFlag,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            column_title: "XP".to_string(),
            max_workers: gradebook::DEFAULT_MAX_WORKERS,
            policy: RetryPolicy::default(),
            cancel: CancelFlag::new(),
        }
    }
}

/// Run one full sync cycle for a deployed course.
///
/// Reads are retried like writes; a submission listing that cannot be
/// fetched aborts the cycle with `Err`. Per-student write failures never
/// abort: exhausted retries land in `requeued`, terminal errors in the
/// student's `error` field.
///
/// The options' cancel flag stops the cycle between students; the report
/// comes back marked `aborted` and unwritten students are simply picked up
/// next cycle, since column writes are absolute and awards commit only on
/// a landed write.
pub async fn run_sync(
    api: &dyn CanvasApi,
    course_id: RemoteId,
    course: &CourseDefinition,
    map: &mut ResourceMap,
    store: &dyn ResourceMapStore,
    ledger: &mut AwardLedger,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let _span = obs::SyncSpan::enter(&course.course_code);
    let evaluator = Evaluator::new(course)?;
    let budget = Arc::new(RateLimitBudget::default());

    let submissions = options
        .policy
        .execute(&budget, || api.list_submissions(course_id))
        .await?;
    obs::emit_sync_started(&course.course_code, submissions.len());

    let by_student = group_by_student(&submissions, &assignment_index(course, map));
    let deployed = deployed_modules(course, map);

    let writer = GradebookWriter::new(api, course_id)
        .with_policy(options.policy.clone())
        .with_budget(Arc::clone(&budget))
        .with_max_workers(options.max_workers)
        .with_cancel(options.cancel.clone());

    let mut report = SyncReport::new(&course.course_code, &options.column_title);
    if options.cancel.is_cancelled() {
        report.aborted = true;
        return Ok(report);
    }
    let column_id = writer
        .ensure_column(&options.column_title, map, store)
        .await?;
    let mut totals: Vec<(RemoteId, u32)> = Vec::with_capacity(by_student.len());
    let mut new_awards: HashMap<i64, BTreeSet<BadgeId>> = HashMap::new();
    let mut seen_warnings: HashSet<String> = HashSet::new();

    let mut student_ids: Vec<i64> = by_student.keys().copied().collect();
    student_ids.sort_unstable();

    for student_id in &student_ids {
        if options.cancel.is_cancelled() {
            report.aborted = true;
            break;
        }
        let submissions = &by_student[student_id];
        let progress = evaluator
            .evaluate(*student_id, submissions, Some(&deployed))
            .with_awarded_badges(ledger.awarded(*student_id));

        for warning in &progress.warnings {
            if seen_warnings.insert(warning.to_string()) {
                report.warnings.push(warning.clone());
            }
        }

        let outcome = scoring::score(&progress, course);
        totals.push((*student_id, outcome.xp_total));
        report.students.push(StudentSyncOutcome {
            student_id: *student_id,
            xp_total: outcome.xp_total,
            new_badges: outcome.new_badges.iter().cloned().collect(),
            written: false,
            error: None,
        });
        new_awards.insert(*student_id, outcome.new_badges);
    }

    let results = if report.aborted {
        Vec::new()
    } else {
        writer.write_all(column_id, &totals).await
    };
    for (student_id, result) in results {
        let Some(entry) = report
            .students
            .iter_mut()
            .find(|s| s.student_id == student_id)
        else {
            continue;
        };
        match result {
            Ok(()) => {
                entry.written = true;
                // Awards commit only once the write-back lands.
                if let Some(badges) = new_awards.remove(&student_id) {
                    ledger.record(student_id, badges);
                }
            }
            Err(err @ CanvasError::RetriesExhausted { .. }) => {
                warn!(student_id, "write-back exhausted retries, requeueing");
                entry.error = Some(err.to_string());
                report.requeued.push(student_id);
            }
            Err(err) => {
                entry.error = Some(err.to_string());
            }
        }
    }
    if options.cancel.is_cancelled() {
        report.aborted = true;
    }
    report.requeued.sort_unstable();

    obs::emit_sync_finished(
        &course.course_code,
        report.written_count(),
        report.requeued.len(),
    );
    info!(
        course = %course.course_code,
        students = report.students.len(),
        written = report.written_count(),
        "sync cycle complete"
    );
    Ok(report)
}

/// Remote assignment id → content-model item id, via the resource map.
fn assignment_index(course: &CourseDefinition, map: &ResourceMap) -> HashMap<RemoteId, ItemId> {
    let mut index = HashMap::new();
    for (_, item) in course.items() {
        if !item.is_graded() {
            continue;
        }
        if let Some(remote) = map.remote_id(&item_key(item.id())) {
            index.insert(remote, item.id().to_string());
        }
    }
    index
}

/// Modules the resource map says have been deployed.
fn deployed_modules(course: &CourseDefinition, map: &ResourceMap) -> HashSet<ModuleId> {
    course
        .modules
        .iter()
        .filter(|m| map.remote_id(&module_key(&m.id)).is_some())
        .map(|m| m.id.clone())
        .collect()
}

/// Group the raw submission listing into per-student submission sets keyed
/// by content-model item id. Submissions for assignments the engine did not
/// deploy are ignored.
fn group_by_student(
    submissions: &[Submission],
    index: &HashMap<RemoteId, ItemId>,
) -> HashMap<i64, SubmissionSet> {
    let mut by_student: HashMap<i64, SubmissionSet> = HashMap::new();
    for submission in submissions {
        let Some(item_id) = index.get(&submission.assignment_id) else {
            continue;
        };
        by_student.entry(submission.user_id).or_default().insert(
            item_id.clone(),
            ItemProgress {
                score: submission.score,
                completed_at: submission.submitted_at,
            },
        );
    }
    by_student
}
