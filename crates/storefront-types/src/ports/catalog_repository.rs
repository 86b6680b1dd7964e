use async_trait::async_trait;
use uuid::Uuid;

use super::order_repository::RepoError;
use crate::domain::inventory::StockRef;
use crate::domain::store::{Product, Store};

#[async_trait]
pub trait CatalogRepository: Send + Sync + 'static {
    async fn create_store(&self, store: Store) -> Result<Store, RepoError>;
    async fn get_store(&self, id: Uuid) -> Result<Option<Store>, RepoError>;
    async fn create_product(&self, product: Product) -> Result<Product, RepoError>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError>;
    async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>, RepoError>;
    /// Removes the product and its variants. Orders keep their snapshots.
    async fn delete_product(&self, id: Uuid) -> Result<bool, RepoError>;
    /// Overwrites a stock counter; returns false when the target is gone.
    async fn set_stock(&self, target: StockRef, stock: i64) -> Result<bool, RepoError>;
}
