//! Questline - Gamified Course Deployment CLI
//!
//! The `questline` command deploys a gamified course definition into a
//! Canvas LMS course and runs progression/XP sync cycles against it.
//!
//! ## Commands
//!
//! - `validate`: Parse and validate a course definition file
//! - `deploy`: Idempotently push the content model into Canvas
//! - `sync`: Pull submissions, evaluate progression, write XP back
//! - `render-report`: Render a saved report artifact as markdown
//!
//! Canvas credentials come from `CANVAS_BASE_URL` and `CANVAS_TOKEN`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use questline_canvas::{
    CanvasConfig, FsResourceMapStore, HttpCanvasClient, RateLimitBudget, RemoteId,
    ResourceMapStore,
};
use questline_core::{
    load_course_file, render_deployment_md, render_sync_md, run_sync, validate, write_report_json,
    AwardLedger, Deployer, DeploymentReport, SyncOptions, SyncReport,
};

#[derive(Parser)]
#[command(name = "questline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Gamified course deployment and mastery sync for Canvas LMS", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a course definition file
    Validate {
        /// Path to the course definition (JSON)
        course: PathBuf,
    },

    /// Deploy a course definition into a Canvas course
    Deploy {
        /// Path to the course definition (JSON)
        course: PathBuf,

        /// Remote Canvas course id
        #[arg(long)]
        course_id: RemoteId,

        /// Resource map file (created on first deploy)
        #[arg(long, default_value = ".questline/resource_map.json")]
        resource_map: PathBuf,

        /// Write the deployment report artifact here
        #[arg(long)]
        report_out: Option<PathBuf>,
    },

    /// Run one sync cycle: submissions in, XP and badges out
    Sync {
        /// Path to the course definition (JSON)
        course: PathBuf,

        /// Remote Canvas course id
        #[arg(long)]
        course_id: RemoteId,

        /// Resource map file from the deployment
        #[arg(long, default_value = ".questline/resource_map.json")]
        resource_map: PathBuf,

        /// Badge award ledger file
        #[arg(long, default_value = ".questline/awards.json")]
        awards: PathBuf,

        /// Gradebook column title for XP totals
        #[arg(long, default_value = "XP")]
        column_title: String,

        /// Concurrent gradebook writes
        #[arg(long, default_value = "4")]
        max_workers: usize,

        /// Write the sync report artifact here
        #[arg(long)]
        report_out: Option<PathBuf>,
    },

    /// Render a saved report artifact (deploy or sync) as markdown
    RenderReport {
        /// Path to a report JSON artifact
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    questline_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate { course } => cmd_validate(&course),
        Commands::Deploy {
            course,
            course_id,
            resource_map,
            report_out,
        } => cmd_deploy(&course, course_id, &resource_map, report_out.as_deref()).await,
        Commands::Sync {
            course,
            course_id,
            resource_map,
            awards,
            column_title,
            max_workers,
            report_out,
        } => {
            cmd_sync(
                &course,
                course_id,
                &resource_map,
                &awards,
                column_title,
                max_workers,
                report_out.as_deref(),
            )
            .await
        }
        Commands::RenderReport { report } => cmd_render_report(&report),
    }
}

/// Parse and validate a course definition
fn cmd_validate(course_path: &Path) -> Result<()> {
    let course = load_course_file(course_path)
        .with_context(|| format!("Failed to load course definition: {:?}", course_path))?;
    validate(&course).context("Course definition is invalid")?;

    let items: usize = course.modules.iter().map(|m| m.items.len()).sum();
    println!("{} ({})", course.title, course.course_code);
    println!("Modules: {}", course.modules.len());
    println!("Items:   {}", items);
    println!("Badges:  {}", course.badges.len());
    println!("OK");
    Ok(())
}

/// Deploy a course definition into Canvas
async fn cmd_deploy(
    course_path: &Path,
    course_id: RemoteId,
    map_path: &Path,
    report_out: Option<&Path>,
) -> Result<()> {
    let course = load_course_file(course_path)
        .with_context(|| format!("Failed to load course definition: {:?}", course_path))?;
    validate(&course).context("Course definition is invalid")?;

    if let Some(parent) = map_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let store = FsResourceMapStore::new(map_path);
    let mut map = store.load().context("Failed to load resource map")?;

    let budget = Arc::new(RateLimitBudget::default());
    let config = CanvasConfig::from_env().context("Canvas credentials not configured")?;
    let client = HttpCanvasClient::new(config, Arc::clone(&budget))?;

    let deployer = Deployer::new(&client, course_id).with_budget(budget);
    let report = deployer.deploy(&course, &mut map, &store).await?;

    print!("{}", render_deployment_md(&report));
    if let Some(path) = report_out {
        write_report_json(path, &report)?;
        info!(path = ?path, "deployment report written");
    }

    if !report.overall_success() {
        bail!("deployment finished with failures");
    }
    Ok(())
}

/// Run one sync cycle
async fn cmd_sync(
    course_path: &Path,
    course_id: RemoteId,
    map_path: &Path,
    awards_path: &Path,
    column_title: String,
    max_workers: usize,
    report_out: Option<&Path>,
) -> Result<()> {
    let course = load_course_file(course_path)
        .with_context(|| format!("Failed to load course definition: {:?}", course_path))?;
    validate(&course).context("Course definition is invalid")?;

    let store = FsResourceMapStore::new(map_path);
    let mut map = store.load().context("Failed to load resource map")?;
    if map.is_empty() {
        bail!("resource map {:?} is empty; run `questline deploy` first", map_path);
    }
    let mut ledger = AwardLedger::load(awards_path).context("Failed to load award ledger")?;

    let budget = Arc::new(RateLimitBudget::default());
    let config = CanvasConfig::from_env().context("Canvas credentials not configured")?;
    let client = HttpCanvasClient::new(config, budget)?;

    let options = SyncOptions {
        column_title,
        max_workers,
        ..SyncOptions::default()
    };
    let report = run_sync(
        &client,
        course_id,
        &course,
        &mut map,
        &store,
        &mut ledger,
        &options,
    )
    .await?;

    if let Some(parent) = awards_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    ledger
        .persist(awards_path)
        .context("Failed to persist award ledger")?;

    print!("{}", render_sync_md(&report));
    if let Some(path) = report_out {
        write_report_json(path, &report)?;
        info!(path = ?path, "sync report written");
    }
    Ok(())
}

/// Render a saved report artifact as markdown
fn cmd_render_report(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {:?}", path))?;

    if let Ok(report) = serde_json::from_str::<DeploymentReport>(&content) {
        print!("{}", render_deployment_md(&report));
        return Ok(());
    }
    let report: SyncReport = serde_json::from_str(&content)
        .context("Not a recognized report artifact")?;
    print!("{}", render_sync_md(&report));
    Ok(())
}
