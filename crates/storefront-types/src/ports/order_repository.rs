use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::inventory::{AdjustmentReport, InsufficientStock, OversellPolicy};
use crate::domain::order::{InvalidTransition, Order, OrderStatus, ProofError, StatusChange};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("db error: {0}")]
    DbError(String),
    #[error("order {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    InsufficientStock(#[from] InsufficientStock),
    #[error(transparent)]
    Proof(#[from] ProofError),
}

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub order_id: Uuid,
    pub to: OrderStatus,
    pub actor: Option<Uuid>,
    pub reason: Option<String>,
    pub oversell: OversellPolicy,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub change: StatusChange,
    pub inventory: AdjustmentReport,
}

#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    async fn create(&self, order: Order) -> Result<Order, RepoError>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError>;
    async fn list_by_store(
        &self,
        store_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepoError>;
    async fn attach_payment_proof(
        &self,
        id: Uuid,
        proof: String,
    ) -> Result<Option<Order>, RepoError>;

    /// Re-validates the transition against the stored status, applies the
    /// inventory effect and writes the new status as one unit. Nothing is
    /// persisted when any step fails.
    async fn apply_transition(&self, req: TransitionRequest)
        -> Result<TransitionOutcome, RepoError>;
}
