use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storefront_types::domain::caller::Caller;
use storefront_types::domain::inventory::{AdjustmentReport, InsufficientStock, OversellPolicy, StockRef};
use storefront_types::domain::notification::StatusChanged;
use storefront_types::domain::order::{
    validate_transition, Customer, Order, OrderItem, OrderStatus,
};
use storefront_types::domain::store::Store;
use storefront_types::ports::authorizer::Authorizer;
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::{OrderRepository, TransitionRequest};
use uuid::Uuid;

use super::dispatcher::{ChannelOutcome, NotificationDispatcher};
use crate::auth::StoreRoleAuthorizer;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant_id: Option<Uuid>,
    pub qty: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Every channel delivered or had nothing to send.
    Delivered,
    /// At least one channel gave up; the order change still stands.
    Degraded,
    /// Fan-out is still running in the background.
    Delayed,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationSummary {
    pub status: NotificationStatus,
    pub channels: Vec<ChannelOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub order: Order,
    pub inventory: AdjustmentReport,
    pub notifications: NotificationSummary,
}

pub struct OrderService<R>
where
    R: OrderRepository + CatalogRepository,
{
    repo: Arc<R>,
    authorizer: Arc<dyn Authorizer>,
    dispatcher: Arc<NotificationDispatcher>,
    dispatch_timeout: Duration,
    oversell: OversellPolicy,
}

impl<R> OrderService<R>
where
    R: OrderRepository + CatalogRepository,
{
    pub fn new(repo: Arc<R>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            repo,
            authorizer: Arc::new(StoreRoleAuthorizer),
            dispatcher,
            dispatch_timeout: Duration::from_secs(3),
            oversell: OversellPolicy::Clamp,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_oversell(mut self, policy: OversellPolicy) -> Self {
        self.oversell = policy;
        self
    }

    async fn load_store(&self, id: Uuid) -> Result<Store, AppError> {
        self.repo
            .get_store(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("store {id}")))
    }

    async fn load_order(&self, id: Uuid) -> Result<Order, AppError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {id}")))
    }

    /// Creates a `PENDING_ADMIN` order, copying names and prices from the
    /// catalog. Stock is only checked here, never reserved.
    #[tracing::instrument(skip(self, customer, lines), fields(store_id = %store_id, lines = lines.len()))]
    pub async fn checkout(
        &self,
        store_id: Uuid,
        customer: Customer,
        lines: Vec<CheckoutLine>,
    ) -> Result<Order, AppError> {
        let store = self.load_store(store_id).await?;
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .repo
                .get_product(line.product_id)
                .await?
                .filter(|p| p.store_id == store.id)
                .ok_or_else(|| {
                    AppError::BadRequest(format!("unknown product {}", line.product_id))
                })?;
            let unit_price = product.unit_price(line.variant_id).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "product {} has no variant {:?}",
                    product.id, line.variant_id
                ))
            })?;
            let (target, available) = match line.variant_id.and_then(|v| product.variant(v)) {
                Some(v) => (StockRef::Variant(v.id), v.stock),
                None => (StockRef::Product(product.id), product.stock),
            };
            if i64::from(line.qty) > available {
                return Err(InsufficientStock {
                    target,
                    requested: i64::from(line.qty),
                    available,
                }
                .into());
            }
            items.push(OrderItem {
                product_id: product.id,
                variant_id: line.variant_id,
                name: product.line_name(line.variant_id),
                qty: line.qty,
                unit_price_cents: unit_price,
            });
        }

        let order = Order::new(store.id, customer, store.currency.clone(), items)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let order = self.repo.create(order).await?;
        tracing::info!(order_id = %order.id, total_cents = order.total_cents, "order placed");
        Ok(order)
    }

    pub async fn get_order(&self, caller: &Caller, id: Uuid) -> Result<Order, AppError> {
        let order = self.load_order(id).await?;
        let store = self.load_store(order.store_id).await?;
        if !self.authorizer.can_manage_store(caller, &store) {
            return Err(AppError::Forbidden(format!("order {id}")));
        }
        Ok(order)
    }

    pub async fn list_orders(
        &self,
        caller: &Caller,
        store_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, AppError> {
        let store = self.load_store(store_id).await?;
        if !self.authorizer.can_manage_store(caller, &store) {
            return Err(AppError::Forbidden(format!("store {store_id}")));
        }
        Ok(self.repo.list_by_store(store_id, status).await?)
    }

    /// Stores the customer's proof on a pending order. The bot front-end
    /// calls this with a customer token and the chat the upload came from.
    pub async fn attach_payment_proof(
        &self,
        caller: &Caller,
        id: Uuid,
        proof: String,
        telegram_chat_id: Option<i64>,
    ) -> Result<Order, AppError> {
        let order = self.load_order(id).await?;
        let store = self.load_store(order.store_id).await?;
        if !self
            .authorizer
            .can_submit_proof(caller, &store, &order, telegram_chat_id)
        {
            return Err(AppError::Forbidden(format!("order {id}")));
        }
        self.repo
            .attach_payment_proof(id, proof)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {id}")))
    }

    /// Authorizes, validates and commits a status change, then fans out
    /// notifications. Only the first part can fail the call.
    #[tracing::instrument(
        skip(self, caller, reason),
        fields(order_id = %id, target = %target, caller = %caller.user_id)
    )]
    pub async fn transition(
        &self,
        caller: &Caller,
        id: Uuid,
        target: OrderStatus,
        reason: Option<String>,
    ) -> Result<TransitionReport, AppError> {
        let order = self.load_order(id).await?;
        let store = self.load_store(order.store_id).await?;
        if !self.authorizer.can_transition(caller, &store, &order) {
            return Err(AppError::Forbidden(format!("order {id}")));
        }
        validate_transition(order.status, target)?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let outcome = self
            .repo
            .apply_transition(TransitionRequest {
                order_id: id,
                to: target,
                actor: Some(caller.user_id),
                reason,
                oversell: self.oversell,
            })
            .await?;
        tracing::info!(
            from = %outcome.change.from,
            to = %outcome.change.to,
            skipped_lines = outcome.inventory.skipped.len(),
            "order transition committed"
        );

        let event = self
            .dispatcher
            .event(&outcome.order, &store, &outcome.change);
        let notifications = self.notify(event).await;

        Ok(TransitionReport {
            order: outcome.order,
            inventory: outcome.inventory,
            notifications,
        })
    }

    pub async fn confirm_payment(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<TransitionReport, AppError> {
        self.transition(caller, id, OrderStatus::Paid, None).await
    }

    pub async fn reject_payment(
        &self,
        caller: &Caller,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<TransitionReport, AppError> {
        self.transition(caller, id, OrderStatus::Rejected, reason)
            .await
    }

    // The fan-out runs on its own task so a timeout here leaves it running
    // instead of cancelling deliveries mid-flight.
    async fn notify(&self, event: StatusChanged) -> NotificationSummary {
        let dispatcher = self.dispatcher.clone();
        let order_id = event.order.id;
        let handle = tokio::spawn(async move { dispatcher.dispatch(&event).await });

        match tokio::time::timeout(self.dispatch_timeout, handle).await {
            Ok(Ok(report)) => NotificationSummary {
                status: if report.all_delivered() {
                    NotificationStatus::Delivered
                } else {
                    NotificationStatus::Degraded
                },
                channels: report.channels,
            },
            Ok(Err(e)) => {
                tracing::warn!(%order_id, error = %e, code = "NOTIFICATION_DELIVERY_FAILED", "dispatch task failed");
                NotificationSummary {
                    status: NotificationStatus::Degraded,
                    channels: Vec::new(),
                }
            }
            Err(_) => {
                tracing::warn!(
                    %order_id,
                    timeout_ms = self.dispatch_timeout.as_millis() as u64,
                    "notification dispatch still running; responding without it"
                );
                NotificationSummary {
                    status: NotificationStatus::Delayed,
                    channels: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::templates::NotificationTemplates;
    use crate::config::NotifySettings;
    use storefront_repo::memory::InMemoryRepo;
    use storefront_types::domain::caller::Role;
    use storefront_types::domain::store::Product;

    struct Setup {
        svc: OrderService<InMemoryRepo>,
        repo: Arc<InMemoryRepo>,
        admin: Caller,
        store: Store,
        product: Product,
    }

    async fn setup() -> Setup {
        let repo = Arc::new(InMemoryRepo::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            NotificationTemplates::default(),
            &NotifySettings::default(),
        ));
        let admin = Caller::new(Uuid::new_v4(), Role::Admin);
        let store = repo
            .create_store(Store::new("Shop".into(), admin.user_id, "USD".into(), None).unwrap())
            .await
            .unwrap();
        let product = repo
            .create_product(Product::new(store.id, "Widget".into(), 500, 4, vec![]).unwrap())
            .await
            .unwrap();
        Setup {
            svc: OrderService::new(repo.clone(), dispatcher),
            repo,
            admin,
            store,
            product,
        }
    }

    fn customer() -> Customer {
        Customer {
            telegram_chat_id: 99,
            name: "Alice".into(),
            email: None,
        }
    }

    fn line(product_id: Uuid, qty: u32) -> CheckoutLine {
        CheckoutLine {
            product_id,
            variant_id: None,
            qty,
        }
    }

    #[tokio::test]
    async fn checkout_snapshots_catalog_price() {
        let s = setup().await;
        let order = s
            .svc
            .checkout(s.store.id, customer(), vec![line(s.product.id, 2)])
            .await
            .unwrap();
        assert_eq!(order.total_cents, 1000);
        assert_eq!(order.currency, "USD");
        assert_eq!(order.items[0].name, "Widget");
        assert_eq!(order.status, OrderStatus::PendingAdmin);

        let got = s.svc.get_order(&s.admin, order.id).await.unwrap();
        assert_eq!(got.customer.name, "Alice");
    }

    #[tokio::test]
    async fn checkout_validation_errors_propagate() {
        let s = setup().await;
        let unknown = s
            .svc
            .checkout(s.store.id, customer(), vec![line(Uuid::new_v4(), 1)])
            .await;
        assert!(matches!(unknown, Err(AppError::BadRequest(_))));

        let too_many = s
            .svc
            .checkout(s.store.id, customer(), vec![line(s.product.id, 5)])
            .await;
        assert!(matches!(too_many, Err(AppError::InsufficientStock(_))));

        let empty = s.svc.checkout(s.store.id, customer(), vec![]).await;
        assert!(matches!(empty, Err(AppError::BadRequest(_))));

        let no_store = s
            .svc
            .checkout(Uuid::new_v4(), customer(), vec![line(s.product.id, 1)])
            .await;
        assert!(matches!(no_store, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn confirm_then_confirm_again_is_invalid() {
        let s = setup().await;
        let order = s
            .svc
            .checkout(s.store.id, customer(), vec![line(s.product.id, 3)])
            .await
            .unwrap();

        let report = s.svc.confirm_payment(&s.admin, order.id).await.unwrap();
        assert_eq!(report.order.status, OrderStatus::Paid);
        assert_eq!(report.notifications.status, NotificationStatus::Delivered);
        let product = s.repo.get_product(s.product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 1);

        let again = s.svc.confirm_payment(&s.admin, order.id).await;
        assert!(matches!(again, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn forbidden_and_not_found_paths() {
        let s = setup().await;
        let order = s
            .svc
            .checkout(s.store.id, customer(), vec![line(s.product.id, 1)])
            .await
            .unwrap();

        let stranger = Caller::new(Uuid::new_v4(), Role::Admin);
        let res = s.svc.confirm_payment(&stranger, order.id).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));
        assert!(matches!(
            s.svc.get_order(&stranger, order.id).await,
            Err(AppError::Forbidden(_))
        ));

        let missing = s.svc.confirm_payment(&s.admin, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let skip = s
            .svc
            .transition(&s.admin, order.id, OrderStatus::Delivered, None)
            .await;
        assert!(matches!(skip, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn reject_keeps_reason_and_stock() {
        let s = setup().await;
        let order = s
            .svc
            .checkout(s.store.id, customer(), vec![line(s.product.id, 2)])
            .await
            .unwrap();
        let report = s
            .svc
            .reject_payment(&s.admin, order.id, Some("  amount mismatch ".into()))
            .await
            .unwrap();
        assert_eq!(report.order.status, OrderStatus::Rejected);
        assert_eq!(report.order.status_reason.as_deref(), Some("amount mismatch"));
        let product = s.repo.get_product(s.product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 4);
    }
}
