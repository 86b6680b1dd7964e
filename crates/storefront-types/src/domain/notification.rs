use serde::Serialize;

use super::order::{Order, OrderStatus};
use super::store::Store;

/// Emitted once per committed transition and handed to every notifier.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChanged {
    pub order: Order,
    #[serde(skip)]
    pub store: Store,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub reason: Option<String>,
    /// Customer-facing text rendered from the store's template.
    pub message: String,
}
