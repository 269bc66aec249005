//! Questline Core Library
//!
//! Deployment synchronization and mastery progression for gamified Canvas
//! courses. Re-exports the engine's main entry points for programmatic use.

pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod obs;
pub mod progression;
pub mod report;
pub mod scoring;
pub mod sync;
pub mod telemetry;

pub use error::{QuestlineError, Result, ValidationError};

pub use model::{
    AwardCondition, Badge, BadgeId, CourseDefinition, GamificationConfig, Item, ItemId,
    MasteryCriteria, Module, ModuleId,
};

pub use graph::SkillGraph;
pub use loader::{load_course, load_course_file, validate};

pub use progression::{
    ConfigurationWarning, Evaluator, ItemProgress, StudentProgress, SubmissionSet, UnlockState,
};

pub use report::{
    render_deployment_md, render_sync_md, write_report_json, DeploymentReport, EntityAction,
    EntityOutcome, StudentSyncOutcome, SyncReport,
};

pub use scoring::{score, ScoreOutcome};

pub use sync::deployer::{CancelFlag, Deployer};
pub use sync::gradebook::GradebookWriter;
pub use sync::{run_sync, AwardLedger, SyncOptions};

pub use telemetry::init_tracing;
