//! Stock bookkeeping for order transitions.
//!
//! The planner here is pure: it decides which stock counters move and by how
//! much. Repository adapters apply the plan inside the same transaction that
//! writes the order status, using [`apply_delta`] (or an equivalent atomic SQL
//! update) per line.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEffect {
    None,
    Decrement,
    Restore,
}

impl InventoryEffect {
    /// Stock is taken when payment is confirmed and given back only when a
    /// paid order is cancelled. Rejecting or cancelling an unpaid order
    /// never touched stock, so there is nothing to restore.
    pub fn for_transition(from: OrderStatus, to: OrderStatus) -> Self {
        match (from, to) {
            (OrderStatus::PendingAdmin, OrderStatus::Paid) => InventoryEffect::Decrement,
            (OrderStatus::Paid, OrderStatus::Cancelled) => InventoryEffect::Restore,
            _ => InventoryEffect::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StockRef {
    Product(Uuid),
    Variant(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: Uuid,
    pub target: StockRef,
    /// Negative on decrement, positive on restore.
    pub delta: i64,
}

/// What to do when a decrement would take a counter below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OversellPolicy {
    Reject,
    #[default]
    Clamp,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("insufficient stock for {target:?}: requested {requested}, available {available}")]
pub struct InsufficientStock {
    pub target: StockRef,
    pub requested: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentReport {
    pub applied: Vec<StockAdjustment>,
    /// Lines whose product or variant no longer exists.
    pub skipped: Vec<StockAdjustment>,
    /// Lines where the counter was clamped at zero.
    pub clamped: Vec<StockAdjustment>,
}

impl AdjustmentReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.clamped.is_empty()
    }
}

/// Lines to move for `effect`. A decrement asks for every ordered quantity;
/// a restore gives back only what the confirming transition actually took,
/// as recorded on that history entry.
pub fn plan(order: &Order, effect: InventoryEffect) -> Vec<StockAdjustment> {
    match effect {
        InventoryEffect::None => Vec::new(),
        InventoryEffect::Decrement => order
            .items
            .iter()
            .map(|it| StockAdjustment {
                product_id: it.product_id,
                target: match it.variant_id {
                    Some(v) => StockRef::Variant(v),
                    None => StockRef::Product(it.product_id),
                },
                delta: -i64::from(it.qty),
            })
            .collect(),
        InventoryEffect::Restore => order
            .history
            .iter()
            .rev()
            .find(|c| c.to == OrderStatus::Paid)
            .map(|c| {
                c.stock_moves
                    .iter()
                    .filter(|m| m.delta != 0)
                    .map(|m| StockAdjustment {
                        delta: -m.delta,
                        ..*m
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// New counter value after `adj`. The bool is true when the value was
/// clamped at zero, in which case the counter moved by less than `adj.delta`.
pub fn apply_delta(
    level: i64,
    adj: &StockAdjustment,
    policy: OversellPolicy,
) -> Result<(i64, bool), InsufficientStock> {
    let next = level + adj.delta;
    if next >= 0 {
        return Ok((next, false));
    }
    match policy {
        OversellPolicy::Clamp => Ok((0, true)),
        OversellPolicy::Reject => Err(InsufficientStock {
            target: adj.target,
            requested: -adj.delta,
            available: level,
        }),
    }
}
