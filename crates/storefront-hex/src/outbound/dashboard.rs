use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use storefront_types::domain::notification::StatusChanged;
use storefront_types::domain::order::OrderStatus;
use storefront_types::ports::notifier::{Notifier, NotifyError};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardEvent {
    pub kind: &'static str,
    pub store_id: Uuid,
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub total_cents: i64,
    pub currency: String,
    pub at: DateTime<Utc>,
}

impl From<&StatusChanged> for DashboardEvent {
    fn from(ev: &StatusChanged) -> Self {
        Self {
            kind: "order_status_changed",
            store_id: ev.order.store_id,
            order_id: ev.order.id,
            from: ev.from,
            to: ev.to,
            reason: ev.reason.clone(),
            total_cents: ev.order.total_cents,
            currency: ev.order.currency.clone(),
            at: ev.order.updated_at,
        }
    }
}

/// In-process pub/sub between the dispatcher and connected dashboard
/// sessions. Slow sessions lag and lose events rather than block senders.
#[derive(Clone)]
pub struct DashboardHub {
    tx: broadcast::Sender<DashboardEvent>,
}

impl DashboardHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Returns how many sessions received the event.
    pub fn publish(&self, event: DashboardEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for DashboardHub {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct DashboardNotifier {
    hub: DashboardHub,
}

impl DashboardNotifier {
    pub fn new(hub: DashboardHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Notifier for DashboardNotifier {
    fn channel(&self) -> &'static str {
        "dashboard"
    }

    async fn notify(&self, event: &StatusChanged) -> Result<bool, NotifyError> {
        Ok(self.hub.publish(DashboardEvent::from(event)) > 0)
    }
}
