#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Enable a repo feature: `memory` or `sqlite`.");

use storefront_types::domain::inventory::StockRef;
use storefront_types::domain::order::*;
use storefront_types::domain::store::{Product, Store};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::{
    OrderRepository, RepoError, TransitionOutcome, TransitionRequest,
};
use uuid::Uuid;

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub const DEFAULT_SQLITE_URL: &str = "sqlite://storefront.db";

/// Adapter chosen at startup. With both features on, a `memory:` URL picks
/// the in-memory store and anything else opens SQLite.
#[derive(Clone)]
pub enum Repo {
    #[cfg(feature = "memory")]
    Memory(memory::InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteRepo),
}

pub async fn build_repo(url: Option<&str>) -> anyhow::Result<Repo> {
    Repo::build_repo(url).await
}

impl Repo {
    #[cfg(all(feature = "memory", not(feature = "sqlite")))]
    pub async fn build_repo(_: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self::Memory(memory::InMemoryRepo::new()))
    }

    #[cfg(all(feature = "sqlite", not(feature = "memory")))]
    pub async fn build_repo(database_url: Option<&str>) -> anyhow::Result<Self> {
        let url = database_url.unwrap_or(DEFAULT_SQLITE_URL);
        Ok(Self::Sqlite(sqlite::SqliteRepo::new(url).await?))
    }

    #[cfg(all(feature = "sqlite", feature = "memory"))]
    pub async fn build_repo(database_url: Option<&str>) -> anyhow::Result<Self> {
        match database_url {
            Some(url) if url.starts_with("memory:") => {
                Ok(Self::Memory(memory::InMemoryRepo::new()))
            }
            url => {
                let url = url.unwrap_or(DEFAULT_SQLITE_URL);
                Ok(Self::Sqlite(sqlite::SqliteRepo::new(url).await?))
            }
        }
    }
}

macro_rules! with_repo {
    ($self:ident, $r:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "memory")]
            Repo::Memory($r) => $body,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite($r) => $body,
        }
    };
}

#[async_trait::async_trait]
impl OrderRepository for Repo {
    async fn create(&self, order: Order) -> Result<Order, RepoError> {
        with_repo!(self, r => r.create(order).await)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        with_repo!(self, r => r.get(id).await)
    }

    async fn list_by_store(
        &self,
        store_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepoError> {
        with_repo!(self, r => r.list_by_store(store_id, status).await)
    }

    async fn attach_payment_proof(
        &self,
        id: Uuid,
        proof: String,
    ) -> Result<Option<Order>, RepoError> {
        with_repo!(self, r => r.attach_payment_proof(id, proof).await)
    }

    async fn apply_transition(
        &self,
        req: TransitionRequest,
    ) -> Result<TransitionOutcome, RepoError> {
        with_repo!(self, r => r.apply_transition(req).await)
    }
}

#[async_trait::async_trait]
impl CatalogRepository for Repo {
    async fn create_store(&self, store: Store) -> Result<Store, RepoError> {
        with_repo!(self, r => r.create_store(store).await)
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError> {
        with_repo!(self, r => r.get_store(id).await)
    }

    async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
        with_repo!(self, r => r.create_product(product).await)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        with_repo!(self, r => r.get_product(id).await)
    }

    async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>, RepoError> {
        with_repo!(self, r => r.list_products(store_id).await)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, RepoError> {
        with_repo!(self, r => r.delete_product(id).await)
    }

    async fn set_stock(&self, target: StockRef, stock: i64) -> Result<bool, RepoError> {
        with_repo!(self, r => r.set_stock(target, stock).await)
    }
}
