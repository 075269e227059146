// src/notify/mod.rs
pub mod telegram;
pub mod vk;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::listing::{Listing, SourceKind};

/// Backoff before delivery retry `attempt` (1-based): 500ms doubling,
/// capped at 32s so an over-configured retry count cannot stall a worker.
pub(crate) fn retry_delay(attempt: u8) -> Duration {
    let shift = u32::from(attempt.saturating_sub(1)).min(6);
    Duration::from_millis(500u64 << shift)
}

/// One delivery channel with its opaque credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotifyTarget {
    Telegram { bot_token: String, chat_id: i64 },
    Vk { access_token: String, peer_id: i64 },
}

impl NotifyTarget {
    /// Credential-free label for logs and error summaries.
    pub fn describe(&self) -> String {
        match self {
            NotifyTarget::Telegram { chat_id, .. } => format!("telegram:{chat_id}"),
            NotifyTarget::Vk { peer_id, .. } => format!("vk:{peer_id}"),
        }
    }
}

/// Outbound delivery collaborator: side-effecting, at-least-once, per
/// target. Implementations must not assume ordering across listings.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, target: &NotifyTarget, listing: &Listing) -> Result<()>;
}

/// Plain-text rendering shared by the Telegram and VK senders.
pub fn format_listing(listing: &Listing) -> String {
    let badge = match listing.source {
        SourceKind::Avito => "🔵 Avito",
        SourceKind::Cian => "🟢 Cian",
    };
    let mut parts = vec![format!("{badge}: {}", listing.title)];
    if let Some(p) = listing.price {
        parts.push(format!("💰 {p} ₽"));
    }
    if let Some(a) = listing.area {
        parts.push(format!("📐 {a:.1} м²"));
    }
    if let Some(l) = &listing.location {
        parts.push(format!("📍 {l}"));
    }
    parts.push(listing.url.clone());
    parts.join("\n")
}

/// Routes a listing to every target of a task. A target failure is
/// reported back for the task's error summary; it never stops delivery to
/// the remaining targets.
pub struct FanOut {
    telegram: telegram::TelegramSender,
    vk: vk::VkSender,
}

impl FanOut {
    pub fn new(timeout_secs: u64, max_retries: u8) -> Self {
        Self {
            telegram: telegram::TelegramSender::new()
                .with_timeout(timeout_secs)
                .with_retries(max_retries),
            vk: vk::VkSender::new()
                .with_timeout(timeout_secs)
                .with_retries(max_retries),
        }
    }
}

#[async_trait]
impl NotificationSink for FanOut {
    async fn deliver(&self, target: &NotifyTarget, listing: &Listing) -> Result<()> {
        match target {
            NotifyTarget::Telegram { bot_token, chat_id } => {
                self.telegram.send(bot_token, *chat_id, listing).await
            }
            NotifyTarget::Vk {
                access_token,
                peer_id,
            } => self.vk.send(access_token, *peer_id, listing).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_skips_missing_attributes() {
        let l = Listing {
            source: SourceKind::Cian,
            source_id: "9".into(),
            title: "Студия".into(),
            description: None,
            price: Some(45_000),
            area: None,
            location: None,
            url: "https://cian.ru/rent/9".into(),
            published_at: None,
        };
        let text = format_listing(&l);
        assert!(text.starts_with("🟢 Cian: Студия"));
        assert!(text.contains("45000 ₽"));
        assert!(!text.contains("м²"));
        assert!(text.ends_with("https://cian.ru/rent/9"));
    }

    #[test]
    fn describe_never_leaks_credentials() {
        let t = NotifyTarget::Telegram {
            bot_token: "123:SECRET".into(),
            chat_id: 77,
        };
        assert_eq!(t.describe(), "telegram:77");
        let v = NotifyTarget::Vk {
            access_token: "vk-secret".into(),
            peer_id: -5,
        };
        assert_eq!(v.describe(), "vk:-5");
    }

    #[test]
    fn delivery_backoff_doubles_and_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_secs(1));
        assert_eq!(retry_delay(7), Duration::from_secs(32));
        // no shift overflow however high the retry count is configured
        assert_eq!(retry_delay(u8::MAX), Duration::from_secs(32));
    }

    #[test]
    fn target_serde_round_trips_by_kind_tag() {
        let json = r#"{"kind":"telegram","bot_token":"t","chat_id":1}"#;
        let t: NotifyTarget = serde_json::from_str(json).unwrap();
        assert_eq!(
            t,
            NotifyTarget::Telegram {
                bot_token: "t".into(),
                chat_id: 1
            }
        );
    }
}
