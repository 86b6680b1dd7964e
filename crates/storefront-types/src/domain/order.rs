use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::inventory::StockAdjustment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingAdmin,
    Paid,
    Shipped,
    Delivered,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::PendingAdmin,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingAdmin => "PENDING_ADMIN",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// The transition table. Anything not listed, including staying in the
    /// same status, is denied.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (PendingAdmin, Paid)
                | (PendingAdmin, Rejected)
                | (PendingAdmin, Cancelled)
                | (Paid, Shipped)
                | (Paid, Cancelled)
                | (Shipped, Delivered)
        )
    }

    pub fn next_states(self) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| self.can_transition_to(*s))
            .collect()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move order from {from} to {to}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), InvalidTransition> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("payment proof is empty")]
    Empty,
    #[error("order is {0}; payment proof is only accepted while PENDING_ADMIN")]
    NotAwaitingVerification(OrderStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub telegram_chat_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One order line. Name and price are copied from the catalog at checkout
/// and never re-read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub qty: u32,
    pub unit_price_cents: i64,
}

impl OrderItem {
    pub fn line_total_cents(&self) -> i64 {
        i64::from(self.qty) * self.unit_price_cents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Stock counters this change actually moved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stock_moves: Vec<StockAdjustment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub store_id: Uuid,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_proof: Option<String>,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        store_id: Uuid,
        customer: Customer,
        currency: String,
        items: Vec<OrderItem>,
    ) -> anyhow::Result<Self> {
        if customer.name.trim().is_empty() {
            anyhow::bail!("customer name empty");
        }
        if let Some(email) = &customer.email {
            if !email.contains('@') {
                anyhow::bail!("invalid email");
            }
        }
        if currency.trim().is_empty() {
            anyhow::bail!("currency empty");
        }
        if items.is_empty() {
            anyhow::bail!("items empty");
        }
        for it in &items {
            if it.qty == 0 {
                anyhow::bail!("item qty must be > 0");
            }
            if it.unit_price_cents < 0 {
                anyhow::bail!("item price must not be negative");
            }
        }
        let total = items.iter().map(OrderItem::line_total_cents).sum();
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            store_id,
            customer,
            items,
            total_cents: total,
            currency,
            status: OrderStatus::PendingAdmin,
            payment_proof: None,
            status_reason: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the order to `to`, recording the change in `history`.
    pub fn apply_transition(
        &mut self,
        to: OrderStatus,
        actor: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<StatusChange, InvalidTransition> {
        validate_transition(self.status, to)?;
        let now = Utc::now();
        let change = StatusChange {
            from: self.status,
            to,
            at: now,
            actor,
            reason: reason.clone(),
            stock_moves: Vec::new(),
        };
        self.status = to;
        self.status_reason = reason;
        self.updated_at = now;
        self.history.push(change.clone());
        Ok(change)
    }

    /// Records what the latest transition did to stock. Zero moves are
    /// dropped since there is nothing to give back later.
    pub fn record_stock_moves(&mut self, moves: &[StockAdjustment]) -> Vec<StockAdjustment> {
        let moved: Vec<StockAdjustment> = moves.iter().copied().filter(|m| m.delta != 0).collect();
        if let Some(last) = self.history.last_mut() {
            last.stock_moves = moved.clone();
        }
        moved
    }

    pub fn attach_payment_proof(&mut self, proof: String) -> Result<(), ProofError> {
        if proof.trim().is_empty() {
            return Err(ProofError::Empty);
        }
        if self.status != OrderStatus::PendingAdmin {
            return Err(ProofError::NotAwaitingVerification(self.status));
        }
        self.payment_proof = Some(proof);
        self.updated_at = Utc::now();
        Ok(())
    }
}
