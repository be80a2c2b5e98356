//! Settings schema with compiled defaults.

use serde::{Deserialize, Serialize};

use apply_core::retry::RetryConfig;
use apply_core::task::DEFAULT_MAX_STEPS;

/// Decision endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    /// API root of an OpenAI-compatible endpoint.
    pub base_url: String,
    /// API key. Usually supplied via `APPLY_LLM_API_KEY`.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Retry policy for transient decision faults.
    pub retry: RetryConfig,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            api_key: String::new(),
            model: "gpt-4o".to_owned(),
            retry: RetryConfig::default(),
        }
    }
}

/// Telegram bot settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelegramSettings {
    /// Bot token from BotFather. Empty disables the bot.
    pub bot_token: String,
    /// The one chat the bot talks to.
    pub chat_id: i64,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: 0,
            poll_timeout_secs: 30,
        }
    }
}

/// Agent run settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentSettings {
    /// Step cap per run.
    pub max_steps: u32,
    /// How long a run waits for a human answer, in seconds.
    pub question_timeout_secs: u64,
    /// Default debug flag for new runs (suppresses final submission).
    pub debug: bool,
    /// Directory for run artifacts (screenshots, metadata).
    pub artifacts_dir: String,
    /// Cap on concurrently running applications.
    pub max_concurrent_runs: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            question_timeout_secs: 300,
            debug: false,
            artifacts_dir: default_home_path("artifacts"),
            max_concurrent_runs: 4,
        }
    }
}

/// Applicant profile used to fill static form fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileSettings {
    /// Full legal name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Path to the resume file.
    pub resume_path: Option<String>,
    /// Path to the cover letter file.
    pub cover_letter_path: Option<String>,
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSettings {
    /// Path to the SQLite database file.
    pub db_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_home_path("apply.db"),
        }
    }
}

/// Top-level settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Decision endpoint.
    pub llm: LlmSettings,
    /// Telegram bot.
    pub telegram: TelegramSettings,
    /// Agent run behavior.
    pub agent: AgentSettings,
    /// Applicant profile.
    pub profile: ProfileSettings,
    /// Persistence.
    pub storage: StorageSettings,
}

fn default_home_path(leaf: &str) -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    format!("{home}/.apply/{leaf}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.llm.model, "gpt-4o");
        assert_eq!(settings.agent.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(settings.agent.question_timeout_secs, 300);
        assert_eq!(settings.telegram.poll_timeout_secs, 30);
        assert!(settings.storage.db_path.ends_with("apply.db"));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"llm": {"model": "gpt-4.1-mini"}}"#).unwrap();
        assert_eq!(settings.llm.model, "gpt-4.1-mini");
        assert_eq!(settings.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.agent.max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert!(json["llm"].get("baseUrl").is_some());
        assert!(json["agent"].get("maxSteps").is_some());
        assert!(json["telegram"].get("pollTimeoutSecs").is_some());
        assert!(json["profile"].get("fullName").is_some());
    }

    #[test]
    fn profile_defaults_are_empty() {
        let settings = Settings::default();
        assert!(settings.profile.full_name.is_empty());
        assert!(settings.profile.resume_path.is_none());
    }
}
