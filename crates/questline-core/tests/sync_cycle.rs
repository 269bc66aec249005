//! End-to-end sync cycle: deploy with the in-memory Canvas, feed
//! submissions, and check progression, XP write-back, badge awarding, and
//! requeue behavior.

use std::time::Duration;

use chrono::Utc;
use questline_canvas::{
    MemoryCanvas, MemoryResourceMapStore, ResourceMapStore, RetryPolicy, ScriptedFailure,
    Submission,
};
use questline_core::{load_course, run_sync, AwardLedger, CancelFlag, Deployer, SyncOptions};

const COURSE_ID: i64 = 42;
const STUDENT: i64 = 7;

fn course_json() -> &'static str {
    r#"{
        "course_code": "CS101-GAME",
        "title": "Intro",
        "modules": [
            {
                "id": "basics",
                "name": "The Basics",
                "mastery_criteria": {"kind": "min_score", "threshold": 80.0},
                "items": [
                    {"type": "assignment", "id": "hw-1", "name": "HW 1",
                     "points_possible": 100.0, "xp": 100}
                ]
            },
            {
                "id": "loops",
                "name": "Loops",
                "unlock_requirements": ["basics"],
                "items": [
                    {"type": "assignment", "id": "hw-2", "name": "HW 2",
                     "points_possible": 100.0, "xp": 50}
                ]
            }
        ],
        "badges": [
            {
                "id": "first-steps",
                "name": "First Steps",
                "condition": {"kind": "complete_all", "targets": ["basics"]}
            }
        ]
    }"#
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        policy: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..SyncOptions::default()
    }
}

/// Deploy the course and return the ambient pieces a cycle needs.
async fn deployed(
    json: &str,
) -> (
    MemoryCanvas,
    MemoryResourceMapStore,
    questline_core::CourseDefinition,
) {
    let course = load_course(json).unwrap();
    let canvas = MemoryCanvas::new();
    let store = MemoryResourceMapStore::new();
    let mut map = store.load().unwrap();
    let report = Deployer::new(&canvas, COURSE_ID)
        .deploy(&course, &mut map, &store)
        .await
        .unwrap();
    assert!(report.overall_success());
    (canvas, store, course)
}

fn submission(assignment_id: i64, score: f64) -> Submission {
    Submission {
        user_id: STUDENT,
        assignment_id,
        score: Some(score),
        submitted_at: Some(Utc::now()),
    }
}

#[tokio::test]
async fn mastering_a_module_unlocks_dependents_and_awards() {
    let (canvas, store, course) = deployed(course_json()).await;
    let mut map = store.load().unwrap();
    let mut ledger = AwardLedger::default();

    let hw1_remote = map.remote_id("item:hw-1").unwrap();
    canvas.set_submissions(vec![submission(hw1_remote, 85.0)]);

    let report = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();

    assert_eq!(report.students.len(), 1);
    let student = &report.students[0];
    assert_eq!(student.student_id, STUDENT);
    assert_eq!(student.xp_total, 100);
    assert_eq!(student.new_badges, vec!["first-steps".to_string()]);
    assert!(student.written);
    assert!(report.requeued.is_empty());

    // The column carries the absolute XP total.
    let column = map.remote_id("gradebook:XP").unwrap();
    assert_eq!(canvas.column_value(column, STUDENT).as_deref(), Some("100"));
}

#[tokio::test]
async fn badges_are_reported_exactly_once_across_cycles() {
    let (canvas, store, course) = deployed(course_json()).await;
    let mut map = store.load().unwrap();
    let mut ledger = AwardLedger::default();

    let hw1_remote = map.remote_id("item:hw-1").unwrap();
    canvas.set_submissions(vec![submission(hw1_remote, 85.0)]);

    let first = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();
    assert_eq!(first.students[0].new_badges.len(), 1);

    let second = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();
    assert!(
        second.students[0].new_badges.is_empty(),
        "a badge must never be reported twice"
    );
    assert_eq!(second.students[0].xp_total, 100, "XP stays absolute");
}

#[tokio::test]
async fn below_threshold_score_leaves_dependent_locked() {
    let (canvas, store, course) = deployed(course_json()).await;
    let mut map = store.load().unwrap();
    let mut ledger = AwardLedger::default();

    let hw1_remote = map.remote_id("item:hw-1").unwrap();
    canvas.set_submissions(vec![submission(hw1_remote, 79.9)]);

    let report = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();

    let student = &report.students[0];
    // Completed but below mastery: XP still lands, badge does not.
    assert_eq!(student.xp_total, 100);
    assert!(student.new_badges.is_empty());
}

#[tokio::test]
async fn exhausted_write_back_requeues_and_holds_the_award() {
    let (canvas, store, course) = deployed(course_json()).await;
    let mut map = store.load().unwrap();
    let mut ledger = AwardLedger::default();

    let hw1_remote = map.remote_id("item:hw-1").unwrap();
    canvas.set_submissions(vec![submission(hw1_remote, 85.0)]);
    // Exactly as many failures as the policy has attempts, so the next
    // cycle's writes succeed.
    canvas.script_failure("put_column_datum", ScriptedFailure::Transient, 2);

    let report = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();

    assert_eq!(report.requeued, vec![STUDENT]);
    assert!(!report.students[0].written);
    assert!(
        report.students[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("retries exhausted")),
        "a requeued student's row must say why the write did not land"
    );
    assert!(
        ledger.awarded(STUDENT).is_empty(),
        "awards commit only once the write-back lands"
    );

    // Next cycle succeeds and commits the award.
    let next = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();
    assert!(next.requeued.is_empty());
    assert!(next.students[0].written);
    assert!(ledger.awarded(STUDENT).contains("first-steps"));
}

#[tokio::test]
async fn cancelled_cycle_aborts_without_mutations() {
    let (canvas, store, course) = deployed(course_json()).await;
    let mut map = store.load().unwrap();
    let mut ledger = AwardLedger::default();

    let hw1_remote = map.remote_id("item:hw-1").unwrap();
    canvas.set_submissions(vec![submission(hw1_remote, 85.0)]);
    let mutations_after_deploy = canvas.mutation_count();

    let options = SyncOptions {
        cancel: CancelFlag::new(),
        ..fast_options()
    };
    options.cancel.cancel();

    let report = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &options,
    )
    .await
    .unwrap();

    assert!(report.aborted);
    assert!(report.students.is_empty());
    assert_eq!(
        canvas.mutation_count(),
        mutations_after_deploy,
        "a cancelled cycle issues no column or gradebook mutations"
    );
    assert!(ledger.awarded(STUDENT).is_empty());

    // A fresh run with an untripped flag completes normally.
    let report = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();
    assert!(!report.aborted);
    assert!(report.students[0].written);
}

#[tokio::test]
async fn module_added_after_deploy_warns_and_stays_locked() {
    // Deploy the two-module course, then sync against a definition that
    // grew a module chain the deployment never saw.
    let (canvas, store, _) = deployed(course_json()).await;
    let mut map = store.load().unwrap();
    let mut ledger = AwardLedger::default();

    let grown = r#"{
        "course_code": "CS101-GAME",
        "title": "Intro",
        "modules": [
            {
                "id": "basics",
                "name": "The Basics",
                "mastery_criteria": {"kind": "min_score", "threshold": 80.0},
                "items": [
                    {"type": "assignment", "id": "hw-1", "name": "HW 1",
                     "points_possible": 100.0, "xp": 100}
                ]
            },
            {"id": "extra", "name": "Extra", "items": []},
            {
                "id": "advanced",
                "name": "Advanced",
                "unlock_requirements": ["extra"],
                "items": []
            }
        ]
    }"#;
    let course = load_course(grown).unwrap();

    let hw1_remote = map.remote_id("item:hw-1").unwrap();
    canvas.set_submissions(vec![submission(hw1_remote, 85.0)]);

    let report = run_sync(
        &canvas,
        COURSE_ID,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &fast_options(),
    )
    .await
    .unwrap();

    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.module == "advanced" && w.detail.contains("never deployed")),
        "undeployed prerequisite must surface as a configuration warning"
    );
}
