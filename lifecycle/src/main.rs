//! Resilient software-delivery pipeline.
//!
//! `lifecycle run` drives one repository through code generation, review,
//! testing, validation, deployment, and health monitoring. `reset` and
//! `cleanup` expose the checkout recovery operations on their own.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;

use lifecycle::core::types::StageStatus;
use lifecycle::error::ClientError;
use lifecycle::exit_codes;
use lifecycle::io::config::{DEFAULT_CONFIG_FILE, Secrets, Settings, load_settings};
use lifecycle::io::generation::GenerationClient;
use lifecycle::io::health::HttpHealthProbe;
use lifecycle::io::repository::RepositoryManager;
use lifecycle::logging;
use lifecycle::pipeline::{DEFAULT_PROJECT_TYPE, PipelineReport, PipelineRequest, run_pipeline};

#[derive(Parser)]
#[command(
    name = "lifecycle",
    version,
    about = "Generate, review, test, deploy, and monitor one repository"
)]
struct Cli {
    /// Settings file. A missing file means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline.
    Run {
        /// Repository to clone (default: REPO_URL, then repository.default_url).
        #[arg(long)]
        repo_url: Option<String>,
        /// Requirements for code generation.
        #[arg(long)]
        requirements: Option<String>,
        #[arg(long, default_value = DEFAULT_PROJECT_TYPE)]
        project_type: String,
    },
    /// Remove the checkout, clone again, and check out a branch.
    Reset {
        #[arg(long)]
        repo_url: Option<String>,
        #[arg(long, default_value = "main")]
        branch: String,
    },
    /// Force-remove the checkout directory.
    Cleanup,
}

fn main() {
    dotenvy::dotenv().ok();
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::FAILURE
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let settings = match load_settings(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid configuration: {err:#}");
            return Ok(exit_codes::INVALID);
        }
    };
    let secrets = Secrets::from_env();
    match cli.command {
        Command::Run {
            repo_url,
            requirements,
            project_type,
        } => cmd_run(&settings, &secrets, repo_url, requirements, project_type),
        Command::Reset { repo_url, branch } => cmd_reset(&settings, &secrets, repo_url, &branch),
        Command::Cleanup => cmd_cleanup(&settings),
    }
}

fn cmd_run(
    settings: &Settings,
    secrets: &Secrets,
    repo_url: Option<String>,
    requirements: Option<String>,
    project_type: String,
) -> Result<i32> {
    let client = match GenerationClient::new(secrets.credential.as_deref(), settings.generation.clone()) {
        Ok(client) => client,
        Err(ClientError::Credential(err)) => {
            eprintln!("{err}");
            return Ok(exit_codes::INVALID);
        }
        Err(err) => return Err(err).context("create generation client"),
    };
    let Some(repo_url) = resolve_repo_url(settings, secrets, repo_url) else {
        eprintln!("repository URL not provided (use --repo-url or set REPO_URL)");
        return Ok(exit_codes::INVALID);
    };
    let probe = HttpHealthProbe::new(Duration::from_secs(settings.monitoring.request_timeout_secs))
        .context("create health probe")?;
    let mut repositories = RepositoryManager::from_settings(&settings.repository);

    let mut request = PipelineRequest {
        repo_url: Some(repo_url),
        project_type,
        ..PipelineRequest::default()
    };
    if let Some(requirements) = requirements {
        request.requirements = requirements;
    }

    let report = run_pipeline(settings, &client, &mut repositories, &probe, &request)
        .context("start pipeline")?;
    print_report(&report);
    if report.succeeded() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FAILURE)
    }
}

fn cmd_reset(
    settings: &Settings,
    secrets: &Secrets,
    repo_url: Option<String>,
    branch: &str,
) -> Result<i32> {
    let Some(repo_url) = resolve_repo_url(settings, secrets, repo_url) else {
        eprintln!("repository URL not provided (use --repo-url or set REPO_URL)");
        return Ok(exit_codes::INVALID);
    };
    let mut repositories = RepositoryManager::from_settings(&settings.repository);
    match repositories.hard_reset(&repo_url, branch) {
        Ok(handle) => {
            println!(
                "{} reset to {} ({branch})",
                handle.local_path.display(),
                handle.remote_url
            );
            Ok(exit_codes::OK)
        }
        Err(err) => {
            error!(err = %err, "reset failed");
            eprintln!("{err}");
            Ok(exit_codes::FAILURE)
        }
    }
}

fn cmd_cleanup(settings: &Settings) -> Result<i32> {
    let repositories = RepositoryManager::from_settings(&settings.repository);
    match repositories.force_cleanup() {
        Ok(()) => {
            println!("{} is clean", repositories.path().display());
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::FAILURE)
        }
    }
}

fn resolve_repo_url(settings: &Settings, secrets: &Secrets, flag: Option<String>) -> Option<String> {
    let non_blank = |url: &String| !url.trim().is_empty();
    flag.filter(non_blank)
        .or_else(|| secrets.repo_url.clone())
        .or_else(|| settings.repository.default_url.clone())
        .filter(non_blank)
}

fn print_report(report: &PipelineReport) {
    if let Some(code) = &report.code {
        println!("\n=== Generated Code ===\n{code}");
    }
    if !report.review.is_empty() {
        println!("\n=== Code Review ===");
        for comment in &report.review {
            println!("- {comment}");
        }
    }
    if let Some(tests) = &report.generated_tests {
        println!("\n=== Generated Tests ===\n{tests}");
    }
    if let Some(deploy) = report
        .deploy
        .as_ref()
        .filter(|deploy| !deploy.stdout.trim().is_empty())
    {
        println!("\n=== Deploy Output ===\n{}", deploy.stdout.trim_end());
    }
    println!("\n=== Stages ===");
    for outcome in &report.stages {
        let mark = match outcome.status {
            StageStatus::Passed => "ok",
            StageStatus::Failed => "FAILED",
        };
        println!("[{mark}] {}: {}", outcome.stage, outcome.detail);
    }
}
