use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use storefront_types::domain::inventory::{
    self, AdjustmentReport, InsufficientStock, InventoryEffect, OversellPolicy, StockAdjustment,
    StockRef,
};
use storefront_types::domain::order::{InvalidTransition, Order, OrderStatus, ProofError};
use storefront_types::domain::store::{Product, Store, Variant};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::{
    OrderRepository, RepoError, TransitionOutcome, TransitionRequest,
};
use uuid::Uuid;

// A transition that loses the optimistic check because only `updated_at`
// moved (say, a proof upload) is replayed this many times.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

const ORDER_COLUMNS: &str = "id, store_id, customer_json, items_json, total_cents, currency, status, payment_proof, status_reason, history_json, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteRepo {
    pool: SqlitePool,
}

fn db_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::DbError(e.to_string())
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, RepoError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(db_err)?
        .with_timezone(&Utc))
}

fn parse_id(s: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(s).map_err(db_err)
}

#[derive(FromRow)]
struct DbOrder {
    id: String,
    store_id: String,
    customer_json: String,
    items_json: String,
    total_cents: i64,
    currency: String,
    status: String,
    payment_proof: Option<String>,
    status_reason: Option<String>,
    history_json: String,
    created_at: String,
    updated_at: String,
}

impl DbOrder {
    fn into_order(self) -> Result<Order, RepoError> {
        Ok(Order {
            id: parse_id(&self.id)?,
            store_id: parse_id(&self.store_id)?,
            customer: serde_json::from_str(&self.customer_json).map_err(db_err)?,
            items: serde_json::from_str(&self.items_json).map_err(db_err)?,
            total_cents: self.total_cents,
            currency: self.currency,
            status: OrderStatus::from_str(&self.status).map_err(db_err)?,
            payment_proof: self.payment_proof,
            status_reason: self.status_reason,
            history: serde_json::from_str(&self.history_json).map_err(db_err)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct DbStore {
    id: String,
    name: String,
    owner_id: String,
    admin_ids_json: String,
    currency: String,
    bot_token: Option<String>,
    created_at: String,
}

impl DbStore {
    fn into_store(self) -> Result<Store, RepoError> {
        Ok(Store {
            id: parse_id(&self.id)?,
            name: self.name,
            owner_id: parse_id(&self.owner_id)?,
            admin_ids: serde_json::from_str(&self.admin_ids_json).map_err(db_err)?,
            currency: self.currency,
            bot_token: self.bot_token,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct DbProduct {
    id: String,
    store_id: String,
    name: String,
    price_cents: i64,
    stock: i64,
    created_at: String,
    updated_at: String,
}

#[derive(FromRow)]
struct DbVariant {
    id: String,
    product_id: String,
    name: String,
    price_cents: Option<i64>,
    stock: i64,
}

impl DbVariant {
    fn into_variant(self) -> Result<Variant, RepoError> {
        Ok(Variant {
            id: parse_id(&self.id)?,
            product_id: parse_id(&self.product_id)?,
            name: self.name,
            price_cents: self.price_cents,
            stock: self.stock,
        })
    }
}

impl DbProduct {
    fn into_product(self, variants: Vec<Variant>) -> Result<Product, RepoError> {
        Ok(Product {
            id: parse_id(&self.id)?,
            store_id: parse_id(&self.store_id)?,
            name: self.name,
            price_cents: self.price_cents,
            stock: self.stock,
            variants,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn stock_table(target: StockRef) -> (&'static str, Uuid) {
    match target {
        StockRef::Product(id) => ("products", id),
        StockRef::Variant(id) => ("variants", id),
    }
}

impl SqliteRepo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options).await?;

        let ddl = include_str!("../migrations/0001_create_storefront.sql");
        for stmt in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    async fn fetch_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        let row: Option<DbOrder> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(DbOrder::into_order).transpose()
    }

    async fn variants_for(&self, product_ids: &[String]) -> Result<Vec<Variant>, RepoError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; product_ids.len()].join(", ");
        let sql = format!(
            "SELECT id, product_id, name, price_cents, stock FROM variants WHERE product_id IN ({placeholders}) ORDER BY rowid"
        );
        let mut query = sqlx::query_as::<_, DbVariant>(&sql);
        for id in product_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter().map(DbVariant::into_variant).collect()
    }

    /// Applies one line inside the open transaction. `Ok(None)` means the
    /// target row is gone; `Ok(Some(moved))` is how far the counter actually
    /// moved, which is short of `adj.delta` only when clamped.
    async fn adjust_line(
        tx: &mut Transaction<'_, Sqlite>,
        adj: &StockAdjustment,
        policy: OversellPolicy,
    ) -> Result<Option<i64>, RepoError> {
        let (table, id) = stock_table(adj.target);
        let id = id.to_string();

        if adj.delta >= 0 {
            let res = sqlx::query(&format!("UPDATE {table} SET stock = stock + ? WHERE id = ?"))
                .bind(adj.delta)
                .bind(&id)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
            return Ok((res.rows_affected() > 0).then_some(adj.delta));
        }

        let current: Option<(i64,)> = sqlx::query_as(&format!("SELECT stock FROM {table} WHERE id = ?"))
            .bind(&id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        let Some((available,)) = current else {
            return Ok(None);
        };

        match policy {
            OversellPolicy::Reject => {
                let res = sqlx::query(&format!(
                    "UPDATE {table} SET stock = stock + ? WHERE id = ? AND stock + ? >= 0"
                ))
                .bind(adj.delta)
                .bind(&id)
                .bind(adj.delta)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
                if res.rows_affected() == 0 {
                    return Err(InsufficientStock {
                        target: adj.target,
                        requested: -adj.delta,
                        available,
                    }
                    .into());
                }
                Ok(Some(adj.delta))
            }
            OversellPolicy::Clamp => {
                sqlx::query(&format!(
                    "UPDATE {table} SET stock = MAX(stock + ?, 0) WHERE id = ?"
                ))
                .bind(adj.delta)
                .bind(&id)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
                Ok(Some(adj.delta.max(-available.max(0))))
            }
        }
    }
}

#[async_trait]
impl OrderRepository for SqliteRepo {
    async fn create(&self, order: Order) -> Result<Order, RepoError> {
        let customer_json = serde_json::to_string(&order.customer).map_err(db_err)?;
        let items_json = serde_json::to_string(&order.items).map_err(db_err)?;
        let history_json = serde_json::to_string(&order.history).map_err(db_err)?;
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(order.id.to_string())
        .bind(order.store_id.to_string())
        .bind(customer_json)
        .bind(items_json)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(&order.payment_proof)
        .bind(&order.status_reason)
        .bind(history_json)
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        self.fetch_order(id).await
    }

    async fn list_by_store(
        &self,
        store_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<DbOrder> = match status {
            Some(s) => sqlx::query_as(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE store_id = ? AND status = ? ORDER BY created_at"
            ))
            .bind(store_id.to_string())
            .bind(s.as_str())
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE store_id = ? ORDER BY created_at"
            ))
            .bind(store_id.to_string())
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(db_err)?;

        rows.into_iter()
            .map(|r| r.into_order())
            .collect::<Result<Vec<_>, _>>()
    }

    async fn attach_payment_proof(
        &self,
        id: Uuid,
        proof: String,
    ) -> Result<Option<Order>, RepoError> {
        let Some(mut order) = self.fetch_order(id).await? else {
            return Ok(None);
        };
        order.attach_payment_proof(proof)?;
        let res = sqlx::query(
            "UPDATE orders SET payment_proof = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(&order.payment_proof)
        .bind(order.updated_at.to_rfc3339())
        .bind(id.to_string())
        .bind(OrderStatus::PendingAdmin.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            // Verified between our read and write.
            let current = self.fetch_order(id).await?.map(|o| o.status);
            return Err(ProofError::NotAwaitingVerification(
                current.unwrap_or(OrderStatus::PendingAdmin),
            )
            .into());
        }
        Ok(Some(order))
    }

    async fn apply_transition(
        &self,
        req: TransitionRequest,
    ) -> Result<TransitionOutcome, RepoError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let snapshot = self
                .fetch_order(req.order_id)
                .await?
                .ok_or(RepoError::NotFound(req.order_id))?;
            let from = snapshot.status;
            let seen_updated_at = snapshot.updated_at.to_rfc3339();

            let mut order = snapshot;
            let mut change = order.apply_transition(req.to, req.actor, req.reason.clone())?;
            let history_json = serde_json::to_string(&order.history).map_err(db_err)?;

            let mut tx = self.pool.begin().await.map_err(db_err)?;

            // Claim the row first: the write takes SQLite's reserved lock, so a
            // concurrent transition of the same order waits here and then
            // misses the compare below.
            let claimed = sqlx::query(
                "UPDATE orders SET status = ?, status_reason = ?, history_json = ?, updated_at = ?
                 WHERE id = ? AND status = ? AND updated_at = ?",
            )
            .bind(order.status.as_str())
            .bind(&order.status_reason)
            .bind(history_json)
            .bind(order.updated_at.to_rfc3339())
            .bind(order.id.to_string())
            .bind(from.as_str())
            .bind(&seen_updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            if claimed.rows_affected() == 0 {
                drop(tx);
                let current = self
                    .fetch_order(req.order_id)
                    .await?
                    .ok_or(RepoError::NotFound(req.order_id))?;
                if current.status == from {
                    continue;
                }
                return Err(InvalidTransition {
                    from: current.status,
                    to: req.to,
                }
                .into());
            }

            let mut report = AdjustmentReport::default();
            for adj in inventory::plan(&order, InventoryEffect::for_transition(from, req.to)) {
                match Self::adjust_line(&mut tx, &adj, req.oversell).await? {
                    None => {
                        tracing::warn!(
                            order_id = %order.id,
                            target = ?adj.target,
                            "stock target no longer exists; skipping line"
                        );
                        report.skipped.push(adj);
                    }
                    Some(moved) => {
                        if moved != adj.delta {
                            tracing::warn!(order_id = %order.id, target = ?adj.target, "stock clamped at zero");
                            report.clamped.push(adj);
                        }
                        report.applied.push(StockAdjustment { delta: moved, ..adj });
                    }
                }
            }

            change.stock_moves = order.record_stock_moves(&report.applied);
            if !change.stock_moves.is_empty() {
                let history_json = serde_json::to_string(&order.history).map_err(db_err)?;
                sqlx::query("UPDATE orders SET history_json = ? WHERE id = ?")
                    .bind(history_json)
                    .bind(order.id.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }

            tx.commit().await.map_err(db_err)?;
            return Ok(TransitionOutcome {
                order,
                change,
                inventory: report,
            });
        }

        Err(RepoError::DbError(format!(
            "order {} kept changing; transition abandoned",
            req.order_id
        )))
    }
}

#[async_trait]
impl CatalogRepository for SqliteRepo {
    async fn create_store(&self, store: Store) -> Result<Store, RepoError> {
        let admin_ids_json = serde_json::to_string(&store.admin_ids).map_err(db_err)?;
        sqlx::query(
            "INSERT INTO stores (id, name, owner_id, admin_ids_json, currency, bot_token, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(store.id.to_string())
        .bind(&store.name)
        .bind(store.owner_id.to_string())
        .bind(admin_ids_json)
        .bind(&store.currency)
        .bind(&store.bot_token)
        .bind(store.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(store)
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError> {
        let row: Option<DbStore> = sqlx::query_as(
            "SELECT id, name, owner_id, admin_ids_json, currency, bot_token, created_at FROM stores WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(DbStore::into_store).transpose()
    }

    async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO products (id, store_id, name, price_cents, stock, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(product.id.to_string())
        .bind(product.store_id.to_string())
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.created_at.to_rfc3339())
        .bind(product.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        for v in &product.variants {
            sqlx::query(
                "INSERT INTO variants (id, product_id, name, price_cents, stock) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(v.id.to_string())
            .bind(product.id.to_string())
            .bind(&v.name)
            .bind(v.price_cents)
            .bind(v.stock)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(product)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        let row: Option<DbProduct> = sqlx::query_as(
            "SELECT id, store_id, name, price_cents, stock, created_at, updated_at FROM products WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let variants = self.variants_for(&[row.id.clone()]).await?;
        row.into_product(variants).map(Some)
    }

    async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>, RepoError> {
        let rows: Vec<DbProduct> = sqlx::query_as(
            "SELECT id, store_id, name, price_cents, stock, created_at, updated_at FROM products
             WHERE store_id = ? ORDER BY created_at",
        )
        .bind(store_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut by_product: HashMap<Uuid, Vec<Variant>> = HashMap::new();
        for v in self.variants_for(&ids).await? {
            by_product.entry(v.product_id).or_default().push(v);
        }

        rows.into_iter()
            .map(|r| {
                let id = parse_id(&r.id)?;
                r.into_product(by_product.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM variants WHERE product_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let res = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_stock(&self, target: StockRef, stock: i64) -> Result<bool, RepoError> {
        let (table, id) = stock_table(target);
        let res = sqlx::query(&format!("UPDATE {table} SET stock = ? WHERE id = ?"))
            .bind(stock)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }
}
