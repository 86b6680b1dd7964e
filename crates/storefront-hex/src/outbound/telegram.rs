use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storefront_types::domain::notification::StatusChanged;
use storefront_types::ports::notifier::{Notifier, NotifyError};

/// Sends the rendered message to the customer's chat through the store's bot.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    max_attempts: u32,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            max_attempts,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> &'static str {
        "telegram"
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn notify(&self, event: &StatusChanged) -> Result<bool, NotifyError> {
        let Some(token) = event.store.bot_token.as_deref() else {
            tracing::debug!(store_id = %event.store.id, "store has no bot token; skipping telegram");
            return Ok(false);
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let res = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: event.order.customer.telegram_chat_id,
                text: &event.message,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Unavailable(e.without_url().to_string()))?;

        let status = res.status();
        let reply: Option<ApiReply> = res.json().await.ok();
        match reply {
            Some(r) if status.is_success() && r.ok => Ok(true),
            other => {
                let detail = other
                    .and_then(|r| r.description)
                    .unwrap_or_else(|| status.to_string());
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    Err(NotifyError::Unavailable(detail))
                } else {
                    Err(NotifyError::Rejected(detail))
                }
            }
        }
    }
}
