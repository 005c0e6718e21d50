//! y/N confirmation on the terminal.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use docdash_core::{Confirm, DestructiveAction};

pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, action: &DestructiveAction) -> bool {
        if self.assume_yes {
            return true;
        }

        let prompt = action.prompt();
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "{} [y/N] ", prompt);
            let _ = stderr.flush();

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_yes(&line),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Could not read confirmation, treating as no");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Confirmation prompt aborted");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
