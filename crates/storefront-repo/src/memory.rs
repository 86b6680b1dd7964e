use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use storefront_types::domain::inventory::{
    self, apply_delta, AdjustmentReport, InventoryEffect, StockAdjustment, StockRef,
};
use storefront_types::domain::order::{Order, OrderStatus};
use storefront_types::domain::store::{Product, Store};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::{
    OrderRepository, RepoError, TransitionOutcome, TransitionRequest,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct InMemoryRepo {
    pub orders: Arc<DashMap<Uuid, Order>>,
    pub stores: Arc<DashMap<Uuid, Store>>,
    pub products: Arc<DashMap<Uuid, Product>>,
    // Held by every write that touches stock or order status so a
    // transition and its stock changes land together.
    write_gate: Arc<Mutex<()>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            stores: Arc::new(DashMap::new()),
            products: Arc::new(DashMap::new()),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    fn stock_level(&self, product_id: Uuid, target: StockRef) -> Option<i64> {
        let product = self.products.get(&product_id)?;
        match target {
            StockRef::Product(_) => Some(product.stock),
            StockRef::Variant(id) => product.variant(id).map(|v| v.stock),
        }
    }

    fn write_stock(&self, product_id: Uuid, target: StockRef, level: i64) -> bool {
        let Some(mut product) = self.products.get_mut(&product_id) else {
            return false;
        };
        match target {
            StockRef::Product(_) => product.stock = level,
            StockRef::Variant(id) => match product.variants.iter_mut().find(|v| v.id == id) {
                Some(v) => v.stock = level,
                None => return false,
            },
        }
        product.updated_at = chrono::Utc::now();
        true
    }

    fn owner_of(&self, target: StockRef) -> Option<Uuid> {
        match target {
            StockRef::Product(id) => self.products.contains_key(&id).then_some(id),
            StockRef::Variant(id) => self
                .products
                .iter()
                .find(|p| p.variants.iter().any(|v| v.id == id))
                .map(|p| p.id),
        }
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepo {
    async fn create(&self, order: Order) -> Result<Order, RepoError> {
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        Ok(self.orders.get(&id).map(|r| r.clone()))
    }

    async fn list_by_store(
        &self,
        store_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepoError> {
        let mut list: Vec<Order> = self
            .orders
            .iter()
            .filter(|kv| kv.store_id == store_id)
            .filter(|kv| status.map_or(true, |s| kv.status == s))
            .map(|kv| kv.value().clone())
            .collect();
        list.sort_by_key(|o| o.created_at);
        Ok(list)
    }

    async fn attach_payment_proof(
        &self,
        id: Uuid,
        proof: String,
    ) -> Result<Option<Order>, RepoError> {
        let _gate = self.write_gate.lock().await;
        if let Some(mut v) = self.orders.get_mut(&id) {
            v.attach_payment_proof(proof)?;
            return Ok(Some(v.clone()));
        }
        Ok(None)
    }

    async fn apply_transition(
        &self,
        req: TransitionRequest,
    ) -> Result<TransitionOutcome, RepoError> {
        let _gate = self.write_gate.lock().await;

        let mut order = self
            .orders
            .get(&req.order_id)
            .map(|r| r.clone())
            .ok_or(RepoError::NotFound(req.order_id))?;
        let from = order.status;
        let mut change = order.apply_transition(req.to, req.actor, req.reason.clone())?;

        // Stage every counter first; nothing is written until all lines pass.
        let mut staged: HashMap<StockRef, (Uuid, i64)> = HashMap::new();
        let mut report = AdjustmentReport::default();
        for adj in inventory::plan(&order, InventoryEffect::for_transition(from, req.to)) {
            let current = match staged.get(&adj.target) {
                Some((_, level)) => Some(*level),
                None => self.stock_level(adj.product_id, adj.target),
            };
            let Some(level) = current else {
                tracing::warn!(
                    order_id = %order.id,
                    target = ?adj.target,
                    "stock target no longer exists; skipping line"
                );
                report.skipped.push(adj);
                continue;
            };
            let (next, clamped) = apply_delta(level, &adj, req.oversell)?;
            if clamped {
                tracing::warn!(order_id = %order.id, target = ?adj.target, "stock clamped at zero");
                report.clamped.push(adj);
            }
            staged.insert(adj.target, (adj.product_id, next));
            report.applied.push(StockAdjustment {
                delta: next - level,
                ..adj
            });
        }
        change.stock_moves = order.record_stock_moves(&report.applied);

        for (target, (product_id, level)) in staged {
            self.write_stock(product_id, target, level);
        }
        self.orders.insert(order.id, order.clone());

        Ok(TransitionOutcome {
            order,
            change,
            inventory: report,
        })
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepo {
    async fn create_store(&self, store: Store) -> Result<Store, RepoError> {
        self.stores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError> {
        Ok(self.stores.get(&id).map(|r| r.clone()))
    }

    async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        Ok(self.products.get(&id).map(|r| r.clone()))
    }

    async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>, RepoError> {
        let mut list: Vec<Product> = self
            .products
            .iter()
            .filter(|kv| kv.store_id == store_id)
            .map(|kv| kv.value().clone())
            .collect();
        list.sort_by_key(|p| p.created_at);
        Ok(list)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, RepoError> {
        let _gate = self.write_gate.lock().await;
        Ok(self.products.remove(&id).is_some())
    }

    async fn set_stock(&self, target: StockRef, stock: i64) -> Result<bool, RepoError> {
        let _gate = self.write_gate.lock().await;
        match self.owner_of(target) {
            Some(product_id) => Ok(self.write_stock(product_id, target, stock)),
            None => Ok(false),
        }
    }
}
