//! Long-running Telegram bot.
//!
//! Listens for commands, stages job URLs, and runs applications as
//! independent background runs. Free text resolves the oldest open
//! question first, so mid-run questions (salary, codes) and commands share
//! one chat without interfering.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use tracing::{error, info, warn};

use apply_core::ids::RunId;
use apply_core::task::{JobPosting, Task};
use apply_interaction::channel::{InteractionRouter, UserChannel};
use apply_interaction::telegram::api::next_offset;
use apply_interaction::telegram::{TelegramApi, TelegramChannel};
use apply_runtime::agent::AgentLoop;
use apply_runtime::runs::RunRegistry;

use crate::{AppContext, host_of, launch_driver, loop_config, make_decision_client, profile_from_settings};

const DEBUG_CONFIG_KEY: &str = "debug_mode";

const HELP_TEXT: &str = "Commands:\n\
    Send a job URL to stage it.\n\
    /apply - apply to the staged URL\n\
    /status - active runs and recent attempts\n\
    /debug on|off - toggle dry-run mode\n\
    /cancel - cancel all active runs\n\
    /help - this message";

/// The bot loop and its shared state.
pub struct TelegramBot {
    ctx: Arc<AppContext>,
    api: Arc<TelegramApi>,
    chat_id: i64,
    router: Arc<InteractionRouter>,
    registry: Arc<RunRegistry>,
    staged_url: Option<String>,
    offset: i64,
}

impl TelegramBot {
    /// Build and run the bot until the process is stopped.
    pub async fn start(ctx: AppContext) -> Result<()> {
        if ctx.settings.telegram.bot_token.is_empty() {
            bail!("no Telegram bot token configured; set telegram.botToken or APPLY_BOT_TOKEN");
        }
        if ctx.settings.telegram.chat_id == 0 {
            bail!("no Telegram chat configured; set telegram.chatId or APPLY_CHAT_ID");
        }

        let api = Arc::new(
            TelegramApi::new(&ctx.settings.telegram.bot_token).context("building telegram client")?,
        );
        let bot = Self {
            chat_id: ctx.settings.telegram.chat_id,
            registry: Arc::new(RunRegistry::new(ctx.settings.agent.max_concurrent_runs)),
            router: Arc::new(InteractionRouter::new()),
            api,
            ctx: Arc::new(ctx),
            staged_url: None,
            offset: 0,
        };
        bot.run().await
    }

    async fn run(mut self) -> Result<()> {
        info!(chat_id = self.chat_id, "telegram bot started");
        self.send("Bot started. Send a job URL, then /apply.").await;

        loop {
            let updates = match self
                .api
                .get_updates(self.offset, self.ctx.settings.telegram.poll_timeout_secs)
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };
            self.offset = next_offset(self.offset, &updates);

            for update in updates {
                let Some(message) = update.message else { continue };
                if message.chat.id != self.chat_id {
                    continue;
                }
                let Some(text) = message.text else { continue };
                let text = text.trim().to_owned();
                if text.is_empty() {
                    continue;
                }
                self.handle_text(&text).await;
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        // An open question owns the next non-command message.
        if !text.starts_with('/') && self.router.pending_count() > 0 {
            if let Some(run_key) = self.router.resolve_oldest(text) {
                info!(run_key, "answer routed to pending question");
                return;
            }
        }

        if let Some(rest) = text.strip_prefix("/debug") {
            self.handle_debug_toggle(rest.trim()).await;
        } else if text.starts_with("/apply") {
            self.handle_apply().await;
        } else if text.starts_with("/status") {
            self.handle_status().await;
        } else if text.starts_with("/cancel") {
            self.handle_cancel().await;
        } else if text.starts_with("/help") {
            self.send(HELP_TEXT).await;
        } else if text.starts_with("http://") || text.starts_with("https://") {
            self.staged_url = Some(text.split_whitespace().next().unwrap_or(text).to_owned());
            self.send(&format!(
                "URL received: {}\nSend /apply to start.",
                self.staged_url.as_deref().unwrap_or_default()
            ))
            .await;
        } else {
            self.send("Unrecognized message. Send a job URL or /help.").await;
        }
    }

    async fn handle_apply(&mut self) {
        let Some(url) = self.staged_url.clone() else {
            self.send("No URL staged. Send a job URL first.").await;
            return;
        };

        let (profile, documents) = match profile_from_settings(&self.ctx.settings) {
            Ok(parts) => parts,
            Err(e) => {
                self.send(&format!("Cannot apply: {e}")).await;
                return;
            }
        };

        let debug = self.debug_enabled();
        let task = Task::new(
            JobPosting {
                company_name: host_of(&url),
                job_title: "Unknown role".into(),
                job_url: url.clone(),
                board_type: None,
            },
            profile,
            documents,
        )
        .with_debug(debug)
        .with_max_steps(self.ctx.settings.agent.max_steps);

        let run_id = RunId::new();
        let run_key = host_of(&url);
        let cancel = match self.registry.start(&run_key, run_id.clone()) {
            Ok(cancel) => cancel,
            Err(e) => {
                self.send(&format!("Cannot start run: {e}")).await;
                return;
            }
        };

        let decision = match make_decision_client(&self.ctx.settings) {
            Ok(decision) => decision,
            Err(e) => {
                self.registry.complete(&run_key);
                self.send(&format!("Cannot apply: {e}")).await;
                return;
            }
        };

        self.send(&format!(
            "Starting application for {run_key}{}",
            if debug { " (debug mode)" } else { "" }
        ))
        .await;

        let channel = Arc::new(TelegramChannel::new(
            self.api.clone(),
            self.chat_id,
            self.router.clone(),
        ));
        let ctx = self.ctx.clone();
        let registry = self.registry.clone();
        let config = loop_config(&ctx.settings);

        let _handle = tokio::spawn(async move {
            let driver = match launch_driver().await {
                Ok(driver) => driver,
                Err(e) => {
                    error!(error = %e, "browser launch failed");
                    let _ = channel.notify(&format!("Browser launch failed: {e}")).await;
                    registry.complete(&run_key);
                    return;
                }
            };

            let agent = AgentLoop::new(decision, driver, channel.clone(), config)
                .with_artifacts(ctx.artifacts.clone())
                .with_cancel_token(cancel);

            if let Err(e) = ctx
                .service
                .apply(run_id, task, &agent, channel.as_ref())
                .await
            {
                error!(error = %e, "application bookkeeping failed");
                let _ = channel.notify(&format!("Run bookkeeping failed: {e}")).await;
            }
            registry.complete(&run_key);
        });
        self.staged_url = None;
    }

    async fn handle_status(&self) {
        let mut lines = vec![format!("Active runs: {}", self.registry.active_count())];
        match self.ctx.applications.list_all() {
            Ok(records) => {
                for record in records.iter().take(5) {
                    let status = match record.status {
                        apply_store::applications::RecordStatus::Pending => "pending".to_owned(),
                        apply_store::applications::RecordStatus::Finished(s) => s.to_string(),
                    };
                    lines.push(format!("{} - {}: {status}", record.company_name, record.job_title));
                }
            }
            Err(e) => lines.push(format!("History unavailable: {e}")),
        }
        lines.push(format!(
            "Debug mode: {}",
            if self.debug_enabled() { "on" } else { "off" }
        ));
        self.send(&lines.join("\n")).await;
    }

    async fn handle_debug_toggle(&self, arg: &str) {
        match arg {
            "on" | "off" => {
                if let Err(e) = self.ctx.config.set(DEBUG_CONFIG_KEY, arg) {
                    self.send(&format!("Could not persist debug flag: {e}")).await;
                    return;
                }
                self.send(&format!("Debug mode {arg}.")).await;
            }
            _ => self.send("Usage: /debug on|off").await,
        }
    }

    async fn handle_cancel(&self) {
        let active = self.registry.active_count();
        if active == 0 {
            self.send("No active runs.").await;
            return;
        }
        self.registry.shutdown();
        self.router.cancel_all();
        self.send(&format!("Cancelled {active} active run(s).")).await;
    }

    fn debug_enabled(&self) -> bool {
        match self.ctx.config.get(DEBUG_CONFIG_KEY) {
            Ok(Some(value)) => value == "on",
            Ok(None) => self.ctx.settings.agent.debug,
            Err(e) => {
                warn!(error = %e, "config read failed, using settings default");
                self.ctx.settings.agent.debug
            }
        }
    }

    async fn send(&self, text: &str) {
        if let Err(e) = self.api.send_message(self.chat_id, text).await {
            warn!(error = %e, "sendMessage failed");
        }
    }
}
