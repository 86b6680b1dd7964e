use std::collections::HashMap;
use storefront_types::domain::order::{Order, OrderStatus};
use storefront_types::domain::store::Store;
use uuid::Uuid;

/// Customer-facing message templates, one per status, with optional
/// per-store overrides.
///
/// Placeholders: `{order_id}`, `{short_id}`, `{store}`, `{status}`,
/// `{total}`, `{currency}`, `{reason}`, `{customer}`.
#[derive(Debug, Clone)]
pub struct NotificationTemplates {
    defaults: HashMap<OrderStatus, String>,
    per_store: HashMap<Uuid, HashMap<OrderStatus, String>>,
}

impl Default for NotificationTemplates {
    fn default() -> Self {
        let defaults = [
            (
                OrderStatus::PendingAdmin,
                "Order #{short_id} received. We will confirm your payment shortly.",
            ),
            (
                OrderStatus::Paid,
                "Payment for order #{short_id} ({total} {currency}) is confirmed. Thank you, {customer}!",
            ),
            (
                OrderStatus::Shipped,
                "Order #{short_id} from {store} is on its way.",
            ),
            (
                OrderStatus::Delivered,
                "Order #{short_id} has been delivered. Enjoy!",
            ),
            (
                OrderStatus::Rejected,
                "We could not verify the payment for order #{short_id}. {reason}",
            ),
            (
                OrderStatus::Cancelled,
                "Order #{short_id} has been cancelled. {reason}",
            ),
        ]
        .into_iter()
        .map(|(s, t)| (s, t.to_string()))
        .collect();
        Self {
            defaults,
            per_store: HashMap::new(),
        }
    }
}

fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

impl NotificationTemplates {
    pub fn with_store_template(
        mut self,
        store_id: Uuid,
        status: OrderStatus,
        template: impl Into<String>,
    ) -> Self {
        self.per_store
            .entry(store_id)
            .or_default()
            .insert(status, template.into());
        self
    }

    pub fn template_for(&self, store_id: Uuid, status: OrderStatus) -> &str {
        self.per_store
            .get(&store_id)
            .and_then(|m| m.get(&status))
            .or_else(|| self.defaults.get(&status))
            .map(String::as_str)
            .unwrap_or("Order #{short_id} is now {status}.")
    }

    pub fn render(&self, store: &Store, order: &Order, reason: Option<&str>) -> String {
        let id = order.id.to_string();
        let short_id = id.split('-').next().unwrap_or(&id).to_string();
        let vars = [
            ("{order_id}", id.clone()),
            ("{short_id}", short_id),
            ("{store}", store.name.clone()),
            ("{status}", order.status.to_string()),
            ("{total}", format_amount(order.total_cents)),
            ("{currency}", order.currency.clone()),
            ("{reason}", reason.unwrap_or_default().to_string()),
            ("{customer}", order.customer.name.clone()),
        ];
        let mut text = self.template_for(store.id, order.status).to_string();
        for (key, value) in vars {
            text = text.replace(key, &value);
        }
        text.trim().to_string()
    }
}
