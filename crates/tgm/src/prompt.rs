use std::time::Duration;

use async_trait::async_trait;
use tgm_core::{auth::CredentialProvider, errors::Error, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    sync::Mutex,
};

/// Asks for login credentials on the terminal: prompts go to stderr so stdout
/// carries only results.
pub struct TerminalPrompt {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(prompt.as_bytes()).await?;
        stderr.flush().await?;

        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(Error::Auth("stdin closed while waiting for input".to_string())),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for TerminalPrompt {
    async fn encryption_key(&self) -> Result<String> {
        self.ask("Enter database encryption key: ").await
    }

    async fn phone_number(&self) -> Result<String> {
        self.ask("Enter phone number: ").await
    }

    async fn code(&self) -> Result<String> {
        self.ask("Enter authentication code: ").await
    }

    async fn password(&self, hint: &str) -> Result<String> {
        if hint.is_empty() {
            self.ask("Enter password: ").await
        } else {
            self.ask(&format!("Enter password (hint: {hint}): ")).await
        }
    }

    async fn confirm_rate_limit_retry(&self, wait: Duration) -> Result<bool> {
        let answer = self
            .ask(&format!(
                "Rate limited by Telegram. Wait {}s and retry? [y/N]: ",
                wait.as_secs()
            ))
            .await?;
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
