//! Console transport for CLI runs: questions on stdout, answers on stdin.

use std::io::{BufRead as _, Write as _};
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{Answer, InteractionError, Question, UserChannel};

/// Stdin/stdout implementation of [`UserChannel`].
#[derive(Default)]
pub struct ConsoleChannel;

impl ConsoleChannel {
    /// Create a console channel.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UserChannel for ConsoleChannel {
    async fn ask(
        &self,
        _run_key: &str,
        question: Question,
        timeout: Duration,
    ) -> Result<Answer, InteractionError> {
        let mut prompt = question.text.clone();
        if !question.choices.is_empty() {
            prompt.push_str("\nOptions:");
            for choice in &question.choices {
                prompt.push_str("\n- ");
                prompt.push_str(choice);
            }
        }

        let read_line = tokio::task::spawn_blocking(move || {
            let stdout = std::io::stdout();
            {
                let mut out = stdout.lock();
                let _ = writeln!(out, "{prompt}");
                let _ = write!(out, "> ");
                let _ = out.flush();
            }
            let stdin = std::io::stdin();
            let mut line = String::new();
            stdin
                .lock()
                .read_line(&mut line)
                .map(|_| line.trim().to_owned())
        });

        match tokio::time::timeout(timeout, read_line).await {
            Ok(Ok(Ok(text))) => Ok(Answer::Text(text)),
            Ok(Ok(Err(e))) => Err(InteractionError::Transport {
                detail: format!("stdin read failed: {e}"),
            }),
            Ok(Err(join_err)) => Err(InteractionError::Transport {
                detail: format!("stdin task failed: {join_err}"),
            }),
            Err(_) => Ok(Answer::TimedOut),
        }
    }

    async fn notify(&self, message: &str) -> Result<(), InteractionError> {
        println!("{message}");
        Ok(())
    }
}
