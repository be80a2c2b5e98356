//! Telegram-backed [`UserChannel`].
//!
//! Mid-run questions (salary, work authorization, reset codes, captcha
//! text) go to the configured chat; replies are matched back through the
//! shared [`InteractionRouter`]. The update-polling loop that feeds the
//! router lives with the bot, not here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::warn;

use crate::channel::{
    Answer, InteractionError, InteractionRouter, Question, UserChannel, await_answer,
};
use crate::telegram::api::{TelegramApi, TelegramApiError};

/// [`UserChannel`] implementation over the Telegram Bot API.
pub struct TelegramChannel {
    api: Arc<TelegramApi>,
    chat_id: i64,
    router: Arc<InteractionRouter>,
}

impl TelegramChannel {
    /// Build a channel bound to one chat.
    #[must_use]
    pub fn new(api: Arc<TelegramApi>, chat_id: i64, router: Arc<InteractionRouter>) -> Self {
        Self {
            api,
            chat_id,
            router,
        }
    }

    /// The shared router, for the update loop to resolve answers through.
    #[must_use]
    pub fn router(&self) -> &Arc<InteractionRouter> {
        &self.router
    }

    fn format_question(question: &Question) -> String {
        if question.choices.is_empty() {
            question.text.clone()
        } else {
            let mut text = question.text.clone();
            text.push_str("\nOptions:");
            for choice in &question.choices {
                text.push_str("\n- ");
                text.push_str(choice);
            }
            text.push_str("\nReply with your choice.");
            text
        }
    }
}

fn transport_fault(err: &TelegramApiError) -> InteractionError {
    InteractionError::Transport {
        detail: err.to_string(),
    }
}

#[async_trait]
impl UserChannel for TelegramChannel {
    async fn ask(
        &self,
        run_key: &str,
        question: Question,
        timeout: Duration,
    ) -> Result<Answer, InteractionError> {
        // Open the slot before sending so a fast reply cannot race the send.
        let (_pending, rx) = self.router.open(run_key, question.clone())?;

        if let Err(e) = self
            .api
            .send_message(self.chat_id, &Self::format_question(&question))
            .await
        {
            self.router.abandon(run_key);
            return Err(transport_fault(&e));
        }

        await_answer(&self.router, run_key, rx, timeout).await
    }

    async fn notify(&self, message: &str) -> Result<(), InteractionError> {
        self.api
            .send_message(self.chat_id, message)
            .await
            .map_err(|e| transport_fault(&e))
    }

    async fn send_image(&self, caption: &str, base64_png: &str) -> Result<(), InteractionError> {
        match BASE64.decode(base64_png) {
            Ok(bytes) => self
                .api
                .send_photo(self.chat_id, caption, bytes)
                .await
                .map_err(|e| transport_fault(&e)),
            Err(e) => {
                // Undecodable image data: degrade to the caption.
                warn!(error = %e, "screenshot payload was not valid base64");
                self.notify(caption).await
            }
        }
    }
}
