//! CLI for the Jira to GitLab migration engine.
//!
//! Loads the configuration, runs one incremental migration pass and
//! prints a summary. The exit code distinguishes a clean run (0), a run
//! with item or link failures (1) and a fatal abort (2).

use clap::Parser;
use jira2gitlab::{Config, EngineError, MigrationEngine, RunOutcome, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Incremental, restartable migration of Jira issues into GitLab.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "jira2gitlab.toml")]
    config: PathBuf,

    /// Path of the persistent migration state file.
    #[arg(long, default_value = "import_status.json")]
    state_file: PathBuf,

    /// Migrate only these Jira projects (repeatable). Default: all
    /// configured project pairs.
    #[arg(long = "project", value_name = "KEY")]
    projects: Vec<String>,

    /// GitLab admin token, overriding the configuration file.
    #[arg(long, env = "GITLAB_TOKEN")]
    gitlab_token: Option<String>,

    /// Jira password or API token, overriding the configuration file.
    #[arg(long, env = "JIRA_PASSWORD")]
    jira_password: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = Args::parse();

    match run(args).await {
        Ok(outcome) => {
            print_summary(&outcome.summary);

            if let Some(e) = outcome.error {
                error!(error = %e, "Migration aborted");
                return ExitCode::from(2);
            }
            if outcome.summary.all_success() {
                ExitCode::from(0)
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            error!(error = %e, "Critical failure");
            ExitCode::from(2)
        }
    }
}

/// Initializes tracing with environment filter support.
///
/// Log level filtering comes from the `RUST_LOG` env var and defaults
/// to "info".
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Main execution logic.
async fn run(args: Args) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let mut config = Config::load(&args.config)?;
    if let Some(token) = args.gitlab_token {
        config.gitlab.token = token;
    }
    if let Some(password) = args.jira_password {
        config.jira.password = password;
    }

    if !args.projects.is_empty() {
        for project in &args.projects {
            if !config.mappings.projects.contains_key(project) {
                return Err(format!("Jira project '{project}' is not configured").into());
            }
        }
        config
            .mappings
            .projects
            .retain(|key, _| args.projects.contains(key));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(Arc::clone(&cancel));

    let engine: MigrationEngine =
        MigrationEngine::new(config, args.state_file, cancel)
            .await
            .map_err(|e: EngineError| Box::new(e) as Box<dyn std::error::Error>)?;
    Ok(engine.run().await)
}

/// First Ctrl-C requests a graceful stop after the current issue; the
/// engine's unconditional cleanup still runs.
fn spawn_interrupt_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, finishing current issue before shutting down");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

/// Prints the final run summary.
fn print_summary(summary: &RunSummary) {
    println!("\nSummary:");
    println!("  Projects processed: {}", summary.projects_processed);
    println!("  Issues seen: {}", summary.issues_seen);
    println!("  Issues imported: {}", summary.issues_imported);
    println!("  Issues re-imported: {}", summary.issues_recreated);
    println!("  Issues skipped: {}", summary.issues_skipped);
    println!("  Issues failed: {}", summary.issues_failed);
    println!("  Links resolved: {}", summary.links_resolved);
    println!("  Links pending: {}", summary.links_pending);
    println!("  Links failed: {}", summary.links_failed);

    if !summary.unmapped_users.is_empty() {
        println!("\n  Jira users without a mapping (actions attributed to the admin):");
        for (user, count) in &summary.unmapped_users {
            println!("    {user} ({count} actions)");
        }
    }
    if !summary.unmigrated_users.is_empty() {
        println!("\n  Mapped GitLab users that do not exist (actions attributed to the admin):");
        for (user, count) in &summary.unmigrated_users {
            println!("    {user} ({count} actions)");
        }
    }
    if !summary.unreverted_admins.is_empty() {
        println!("\n  WARNING: temporary admin privilege could not be reverted for:");
        for user in &summary.unreverted_admins {
            println!("    {user}");
        }
    }
    if summary.interrupted {
        println!("\n  Run was interrupted; rerun to continue where it left off.");
    }
}
