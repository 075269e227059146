// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;

use super::format_listing;
use crate::listing::Listing;

/// Telegram Bot API sender. Credentials arrive per call because every task
/// carries its own bot token and chat.
#[derive(Clone)]
pub struct TelegramSender {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub async fn send(&self, bot_token: &str, chat_id: i64, listing: &Listing) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
        let payload = SendMessage {
            chat_id,
            text: format_listing(listing),
            disable_web_page_preview: false,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(super::retry_delay(attempt)).await;
                            continue;
                        }
                        return Err(anyhow!("Telegram HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(super::retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("Telegram request failed: {e}"));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct SendMessage {
    chat_id: i64,
    text: String,
    disable_web_page_preview: bool,
}
