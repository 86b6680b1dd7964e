//! Fan-out of status changes to every configured notification channel.
//!
//! Channels run concurrently and independently: each attempt has its own
//! timeout, each channel its own retry budget, and a failing channel only
//! shows up in the [`DispatchReport`]. Nothing here returns an error.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use storefront_types::domain::notification::StatusChanged;
use storefront_types::domain::order::{Order, StatusChange};
use storefront_types::domain::store::Store;
use storefront_types::ports::notifier::{Notifier, NotifyError};

use super::templates::NotificationTemplates;
use crate::config::NotifySettings;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Delivered,
    /// The channel had nothing to send for this order.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub channel: &'static str,
    pub state: DeliveryState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub channels: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.channels
            .iter()
            .all(|c| c.state != DeliveryState::Failed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ChannelOutcome> {
        self.channels
            .iter()
            .filter(|c| c.state == DeliveryState::Failed)
    }
}

pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    templates: NotificationTemplates,
    attempt_timeout: Duration,
    backoff: Duration,
}

impl NotificationDispatcher {
    pub fn new(templates: NotificationTemplates, settings: &NotifySettings) -> Self {
        Self {
            notifiers: Vec::new(),
            templates,
            attempt_timeout: settings.attempt_timeout,
            backoff: settings.backoff,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn channels(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|n| n.channel()).collect()
    }

    pub fn event(&self, order: &Order, store: &Store, change: &StatusChange) -> StatusChanged {
        StatusChanged {
            message: self
                .templates
                .render(store, order, change.reason.as_deref()),
            order: order.clone(),
            store: store.clone(),
            from: change.from,
            to: change.to,
            reason: change.reason.clone(),
        }
    }

    pub async fn dispatch(&self, event: &StatusChanged) -> DispatchReport {
        let deliveries = self
            .notifiers
            .iter()
            .map(|notifier| self.deliver(notifier.as_ref(), event));
        let channels = join_all(deliveries).await;
        DispatchReport { channels }
    }

    async fn deliver(&self, notifier: &dyn Notifier, event: &StatusChanged) -> ChannelOutcome {
        let channel = notifier.channel();
        let max_attempts = notifier.max_attempts().max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let result = match tokio::time::timeout(self.attempt_timeout, notifier.notify(event))
                .await
            {
                Ok(r) => r,
                Err(_) => Err(NotifyError::Timeout(self.attempt_timeout.as_millis())),
            };
            match result {
                Ok(sent) => {
                    tracing::debug!(channel, attempt, order_id = %event.order.id, sent, "notification handled");
                    return ChannelOutcome {
                        channel,
                        state: if sent {
                            DeliveryState::Delivered
                        } else {
                            DeliveryState::Skipped
                        },
                        attempts: attempt,
                        error: None,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        channel,
                        attempt,
                        max_attempts,
                        order_id = %event.order.id,
                        error = %e,
                        "notification attempt failed"
                    );
                    last_error = Some(e.to_string());
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }

        tracing::warn!(
            code = "NOTIFICATION_DELIVERY_FAILED",
            channel,
            order_id = %event.order.id,
            "dropping notification"
        );
        ChannelOutcome {
            channel,
            state: DeliveryState::Failed,
            attempts: max_attempts,
            error: last_error,
        }
    }
}
