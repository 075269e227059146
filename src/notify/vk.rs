// src/notify/vk.rs
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;

use super::format_listing;
use crate::listing::Listing;

const VK_API_VERSION: &str = "5.199";

/// VK `messages.send` sender.
#[derive(Clone)]
pub struct VkSender {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl Default for VkSender {
    fn default() -> Self {
        Self::new()
    }
}

impl VkSender {
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

    pub async fn send(&self, access_token: &str, peer_id: i64, listing: &Listing) -> Result<()> {
        let random_id = random_id(listing);
        let text = format_listing(listing);
        let params = [
            ("access_token", access_token.to_string()),
            ("peer_id", peer_id.to_string()),
            ("random_id", random_id.to_string()),
            ("message", text),
            ("v", VK_API_VERSION.to_string()),
        ];

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post("https://api.vk.com/method/messages.send")
                .timeout(self.timeout)
                .form(&params)
                .send()
                .await;

            match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(ok) => {
                        // VK reports API-level failures inside a 200 body.
                        let body: VkResponse = ok
                            .json()
                            .await
                            .map_err(|e| anyhow!("VK response parse failed: {e}"))?;
                        if let Some(err) = body.error {
                            return Err(anyhow!(
                                "VK API error {}: {}",
                                err.error_code,
                                err.error_msg
                            ));
                        }
                        return Ok(());
                    }
                    Err(e) => {
                        if attempt < self.max_retries {
                            tokio::time::sleep(super::retry_delay(attempt)).await;
                            continue;
                        }
                        return Err(anyhow!("VK HTTP error: {e}"));
                    }
                },
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(super::retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("VK request failed: {e}"));
                }
            }
        }
    }
}

/// VK collapses messages reusing a random_id, so derive it from the
/// listing identity alone: retries of the same listing present the same
/// id, distinct listings present distinct ones.
fn random_id(listing: &Listing) -> i32 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    listing.source.hash(&mut h);
    listing.source_id.hash(&mut h);
    h.finish() as i32
}

#[derive(Deserialize)]
struct VkResponse {
    #[serde(default)]
    error: Option<VkError>,
}

#[derive(Deserialize)]
struct VkError {
    error_code: i64,
    error_msg: String,
}
