//! # apply
//!
//! Command-line entry point: one-off applications from the terminal, the
//! Telegram bot, and read-only views over history and credentials.

#![deny(unsafe_code)]

mod bot;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use apply_browser::CdpPageDriver;
use apply_browser::chrome::find_chrome;
use apply_core::ids::RunId;
use apply_core::outcome::RunStatus;
use apply_core::task::{ApplicantProfile, DocumentSet, JobPosting, Task};
use apply_interaction::console::ConsoleChannel;
use apply_llm::openai::OpenAiDecisionClient;
use apply_runtime::agent::AgentLoop;
use apply_runtime::artifacts::FilesystemArtifactStore;
use apply_runtime::service::ApplicationService;
use apply_runtime::state::LoopConfig;
use apply_settings::Settings;
use apply_store::applications::{ApplicationStore, RecordStatus};
use apply_store::config::ConfigStore;
use apply_store::credentials::{CredentialStore, mask_secret};
use apply_store::migrations::run_migrations;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// LLM-driven job application agent.
#[derive(Parser, Debug)]
#[command(name = "apply", about = "Apply to job postings through an LLM-driven browser agent")]
struct Cli {
    /// Settings file path (defaults to `~/.apply/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply to one job posting from the terminal.
    Apply {
        /// Job posting URL.
        url: String,

        /// Company name (defaults to the URL host).
        #[arg(long)]
        company: Option<String>,

        /// Job title.
        #[arg(long, default_value = "Unknown role")]
        title: String,

        /// Job board hint (e.g. "greenhouse").
        #[arg(long)]
        board: Option<String>,

        /// Suppress the final submission (dry run).
        #[arg(long)]
        debug: bool,

        /// Override the step cap.
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Run the Telegram bot.
    Bot,

    /// List past application attempts.
    History,

    /// List stored account credentials (secrets masked).
    Credentials,
}

/// Shared stores and services, wired once per process.
pub(crate) struct AppContext {
    pub settings: Settings,
    pub applications: Arc<ApplicationStore>,
    pub credentials: Arc<CredentialStore>,
    pub config: Arc<ConfigStore>,
    pub service: Arc<ApplicationService>,
    pub artifacts: Arc<FilesystemArtifactStore>,
}

fn build_context(settings: Settings) -> Result<AppContext> {
    ensure_parent_dir(std::path::Path::new(&settings.storage.db_path))?;
    let pool = apply_store::new_file(&settings.storage.db_path)
        .with_context(|| format!("opening database at {}", settings.storage.db_path))?;
    let migration_conn = pool.get().context("acquiring connection for migrations")?;
    run_migrations(&migration_conn)?;

    let applications = Arc::new(ApplicationStore::new(pool.clone()));
    let credentials = Arc::new(CredentialStore::new(pool.clone()));
    let config = Arc::new(ConfigStore::new(pool));
    let artifacts = Arc::new(FilesystemArtifactStore::new(&settings.agent.artifacts_dir));
    let service = Arc::new(
        ApplicationService::new(applications.clone(), credentials.clone())
            .with_artifacts(artifacts.clone()),
    );

    Ok(AppContext {
        settings,
        applications,
        credentials,
        config,
        service,
        artifacts,
    })
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

pub(crate) fn profile_from_settings(settings: &Settings) -> Result<(ApplicantProfile, DocumentSet)> {
    let profile = &settings.profile;
    if profile.full_name.is_empty() || profile.email.is_empty() {
        bail!(
            "applicant profile is not configured; set profile.fullName and \
             profile.email in {}",
            apply_settings::settings_path().display()
        );
    }
    Ok((
        ApplicantProfile {
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
        },
        DocumentSet {
            resume_path: profile.resume_path.clone(),
            cover_letter_path: profile.cover_letter_path.clone(),
        },
    ))
}

/// Derive a company label from a posting URL host.
pub(crate) fn host_of(url: &str) -> String {
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split('/').next().unwrap_or(stripped);
    host.trim_start_matches("www.").to_owned()
}

pub(crate) fn loop_config(settings: &Settings) -> LoopConfig {
    LoopConfig {
        question_timeout: std::time::Duration::from_secs(settings.agent.question_timeout_secs),
        decision_retry: settings.llm.retry.clone(),
    }
}

pub(crate) fn make_decision_client(settings: &Settings) -> Result<Arc<OpenAiDecisionClient>> {
    if settings.llm.api_key.is_empty() {
        bail!("no decision API key configured; set llm.apiKey or APPLY_LLM_API_KEY");
    }
    Ok(Arc::new(OpenAiDecisionClient::new(
        settings.llm.base_url.clone(),
        settings.llm.api_key.clone(),
        settings.llm.model.clone(),
    )?))
}

pub(crate) async fn launch_driver() -> Result<Arc<CdpPageDriver>> {
    let chrome = find_chrome().context("no Chrome/Chromium binary found; set CHROME_PATH")?;
    let driver = CdpPageDriver::launch(&chrome)
        .await
        .context("launching browser")?;
    Ok(Arc::new(driver))
}

async fn run_apply(
    ctx: &AppContext,
    url: String,
    company: Option<String>,
    title: String,
    board: Option<String>,
    debug: bool,
    max_steps: Option<u32>,
) -> Result<()> {
    let (profile, documents) = profile_from_settings(&ctx.settings)?;
    let task = Task::new(
        JobPosting {
            company_name: company.unwrap_or_else(|| host_of(&url)),
            job_title: title,
            job_url: url,
            board_type: board,
        },
        profile,
        documents,
    )
    .with_debug(debug || ctx.settings.agent.debug)
    .with_max_steps(max_steps.unwrap_or(ctx.settings.agent.max_steps));

    let decision = make_decision_client(&ctx.settings)?;
    let driver = launch_driver().await?;
    let channel = Arc::new(ConsoleChannel::new());

    let agent = AgentLoop::new(decision, driver, channel.clone(), loop_config(&ctx.settings))
        .with_artifacts(ctx.artifacts.clone());

    let run_id = RunId::new();
    info!(run_id = %run_id, "starting application run");
    let report = ctx
        .service
        .apply(run_id, task, &agent, channel.as_ref())
        .await?;

    println!(
        "\nOutcome: {} after {} steps",
        report.result.status, report.result.steps_taken
    );
    if !report.result.reason_text().is_empty() {
        println!("Reason: {}", report.result.reason_text());
    }
    if report.result.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_history(ctx: &AppContext) -> Result<()> {
    let records = ctx.applications.list_all()?;
    if records.is_empty() {
        println!("No applications yet.");
        return Ok(());
    }
    for record in records {
        let status = match record.status {
            RecordStatus::Pending => "pending".to_owned(),
            RecordStatus::Finished(s) => s.to_string(),
        };
        println!(
            "{}  {:8}  {} - {}  {}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            status,
            record.company_name,
            record.job_title,
            record.failure_reason.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn run_credentials(ctx: &AppContext) -> Result<()> {
    let credentials = ctx.credentials.list_all()?;
    if credentials.is_empty() {
        println!("No stored credentials.");
        return Ok(());
    }
    for credential in credentials {
        println!(
            "{:12} {:20} {:30} {}",
            credential.portal,
            credential.tenant,
            credential.email,
            mask_secret(&credential.password),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => apply_settings::load_settings_from_path(path)?,
        None => apply_settings::load_settings()?,
    };
    let ctx = build_context(settings)?;

    match cli.command {
        Command::Apply {
            url,
            company,
            title,
            board,
            debug,
            max_steps,
        } => run_apply(&ctx, url, company, title, board, debug, max_steps).await,
        Command::Bot => bot::TelegramBot::start(ctx).await,
        Command::History => run_history(&ctx),
        Command::Credentials => run_credentials(&ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://jobs.acme.test/careers/1"), "jobs.acme.test");
        assert_eq!(host_of("http://www.acme.test"), "acme.test");
        assert_eq!(host_of("acme.test/1"), "acme.test");
    }

    #[test]
    fn profile_requires_name_and_email() {
        let settings = Settings::default();
        assert!(profile_from_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.profile.full_name = "Jane".into();
        settings.profile.email = "jane@test.com".into();
        let (profile, documents) = profile_from_settings(&settings).unwrap();
        assert_eq!(profile.full_name, "Jane");
        assert!(documents.resume_path.is_none());
    }

    #[test]
    fn loop_config_uses_settings() {
        let mut settings = Settings::default();
        settings.agent.question_timeout_secs = 42;
        let config = loop_config(&settings);
        assert_eq!(config.question_timeout.as_secs(), 42);
    }
}
