use async_trait::async_trait;
use serde::Serialize;
use storefront_types::domain::notification::StatusChanged;
use storefront_types::ports::notifier::{Notifier, NotifyError};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub order_id: Uuid,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Queues a copy of the customer message for customers who left an email.
pub struct EmailNotifier {
    outbox: mpsc::Sender<OutboundEmail>,
}

pub fn outbox(capacity: usize) -> (EmailNotifier, mpsc::Receiver<OutboundEmail>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EmailNotifier { outbox: tx }, rx)
}

/// Drains the outbox. Actual SMTP delivery happens outside this service;
/// here each message is recorded in the log.
pub async fn run_outbox_logger(mut rx: mpsc::Receiver<OutboundEmail>) {
    while let Some(mail) = rx.recv().await {
        tracing::info!(
            order_id = %mail.order_id,
            to = %mail.to,
            subject = %mail.subject,
            "email queued for delivery"
        );
    }
    tracing::debug!("email outbox closed");
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, event: &StatusChanged) -> Result<bool, NotifyError> {
        let Some(to) = event.order.customer.email.clone() else {
            return Ok(false);
        };
        let mail = OutboundEmail {
            order_id: event.order.id,
            to,
            subject: format!("{}: order {}", event.store.name, event.to),
            body: event.message.clone(),
        };
        self.outbox
            .send(mail)
            .await
            .map_err(|_| NotifyError::Unavailable("email outbox closed".into()))?;
        Ok(true)
    }
}
