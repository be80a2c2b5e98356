//! Thin Telegram Bot API client.
//!
//! Speaks the plain HTTP Bot API: `getUpdates` long polling, `sendMessage`,
//! and `sendPhoto` (multipart). Responses use the standard `ok`/`result`
//! envelope.

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

const API_ROOT: &str = "https://api.telegram.org";

/// Bot API failures.
#[derive(Debug, Error)]
pub enum TelegramApiError {
    /// Transport-level failure.
    #[error("telegram transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered `ok: false`.
    #[error("telegram api rejected the call: {description}")]
    Rejected {
        /// The API's description of the problem.
        description: String,
    },
}

/// One update from `getUpdates`.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    /// Monotonic update ID; the next poll offset is the max seen plus one.
    pub update_id: i64,
    /// The message payload, if this update carries one.
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// An incoming chat message.
#[derive(Clone, Debug, Deserialize)]
pub struct IncomingMessage {
    /// Chat the message was sent in.
    pub chat: Chat,
    /// Message text, absent for stickers/media.
    #[serde(default)]
    pub text: Option<String>,
}

/// A chat reference.
#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    /// Chat ID.
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API client bound to one bot token.
pub struct TelegramApi {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramApi {
    /// Create a client for the given bot token.
    pub fn new(bot_token: &str) -> Result<Self, TelegramApiError> {
        Self::with_root(API_ROOT, bot_token)
    }

    /// Create a client against a custom API root (tests).
    pub fn with_root(root: &str, bot_token: &str) -> Result<Self, TelegramApiError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(90))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{bot_token}", root.trim_end_matches('/')),
        })
    }

    /// Long-poll for updates after `offset`.
    #[instrument(skip(self))]
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramApiError> {
        let envelope: Envelope<Vec<Update>> = self
            .http
            .post(format!("{}/getUpdates", self.base_url))
            .form(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_owned()),
            ])
            .send()
            .await?
            .json()
            .await?;
        unwrap_envelope(envelope).map(Option::unwrap_or_default)
    }

    /// Send a text message to a chat.
    #[instrument(skip(self, text))]
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramApiError> {
        let envelope: Envelope<serde_json::Value> = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .form(&[("chat_id", chat_id.to_string()), ("text", text.to_owned())])
            .send()
            .await?
            .json()
            .await?;
        unwrap_envelope(envelope).map(|_| ())
    }

    /// Send a PNG photo with a caption.
    #[instrument(skip(self, png_bytes, caption))]
    pub async fn send_photo(
        &self,
        chat_id: i64,
        caption: &str,
        png_bytes: Vec<u8>,
    ) -> Result<(), TelegramApiError> {
        let part = reqwest::multipart::Part::bytes(png_bytes)
            .file_name("capture.png")
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_owned())
            .part("photo", part);

        let envelope: Envelope<serde_json::Value> = self
            .http
            .post(format!("{}/sendPhoto", self.base_url))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        unwrap_envelope(envelope).map(|_| ())
    }
}

fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<Option<T>, TelegramApiError> {
    if envelope.ok {
        Ok(envelope.result)
    } else {
        Err(TelegramApiError::Rejected {
            description: envelope
                .description
                .unwrap_or_else(|| "no description".to_owned()),
        })
    }
}

/// Compute the next poll offset from a batch of updates.
#[must_use]
pub fn next_offset(current: i64, updates: &[Update]) -> i64 {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .chain(std::iter::once(current))
        .max()
        .unwrap_or(current)
}
