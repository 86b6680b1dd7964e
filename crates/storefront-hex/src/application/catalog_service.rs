use serde::Deserialize;
use std::sync::Arc;
use storefront_types::domain::caller::{Caller, Role};
use storefront_types::domain::inventory::StockRef;
use storefront_types::domain::store::{NewVariant, Product, Store};
use storefront_types::ports::authorizer::Authorizer;
use storefront_types::ports::catalog_repository::CatalogRepository;
use uuid::Uuid;

use crate::auth::StoreRoleAuthorizer;
use crate::errors::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub currency: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub admin_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    #[serde(default)]
    pub variants: Vec<NewVariant>,
}

/// Stores and products. Only what the order lifecycle needs to resolve
/// prices and stock counters.
pub struct CatalogService<R: CatalogRepository> {
    repo: Arc<R>,
    authorizer: Arc<dyn Authorizer>,
}

impl<R: CatalogRepository> CatalogService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            authorizer: Arc::new(StoreRoleAuthorizer),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    async fn managed_store(&self, caller: &Caller, id: Uuid) -> Result<Store, AppError> {
        let store = self
            .repo
            .get_store(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("store {id}")))?;
        if !self.authorizer.can_manage_store(caller, &store) {
            return Err(AppError::Forbidden(format!("store {id}")));
        }
        Ok(store)
    }

    async fn managed_product(&self, caller: &Caller, id: Uuid) -> Result<Product, AppError> {
        let product = self
            .repo
            .get_product(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
        self.managed_store(caller, product.store_id).await?;
        Ok(product)
    }

    pub async fn create_store(&self, caller: &Caller, input: NewStore) -> Result<Store, AppError> {
        if caller.role == Role::Customer {
            return Err(AppError::Forbidden("customers cannot open stores".into()));
        }
        let mut store = Store::new(input.name, caller.user_id, input.currency, input.bot_token)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        store.admin_ids = input.admin_ids;
        let store = self.repo.create_store(store).await?;
        tracing::info!(store_id = %store.id, owner = %store.owner_id, "store created");
        Ok(store)
    }

    pub async fn get_store(&self, caller: &Caller, id: Uuid) -> Result<Store, AppError> {
        self.managed_store(caller, id).await
    }

    pub async fn create_product(
        &self,
        caller: &Caller,
        store_id: Uuid,
        input: NewProduct,
    ) -> Result<Product, AppError> {
        self.managed_store(caller, store_id).await?;
        let product = Product::new(
            store_id,
            input.name,
            input.price_cents,
            input.stock,
            input.variants,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(self.repo.create_product(product).await?)
    }

    pub async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>, AppError> {
        if self.repo.get_store(store_id).await?.is_none() {
            return Err(AppError::NotFound(format!("store {store_id}")));
        }
        Ok(self.repo.list_products(store_id).await?)
    }

    pub async fn delete_product(&self, caller: &Caller, id: Uuid) -> Result<(), AppError> {
        self.managed_product(caller, id).await?;
        if self.repo.delete_product(id).await? {
            tracing::info!(product_id = %id, "product deleted");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("product {id}")))
        }
    }

    pub async fn set_stock(
        &self,
        caller: &Caller,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        stock: i64,
    ) -> Result<Product, AppError> {
        if stock < 0 {
            return Err(AppError::BadRequest("stock must not be negative".into()));
        }
        let product = self.managed_product(caller, product_id).await?;
        let target = match variant_id {
            Some(v) if product.variant(v).is_some() => StockRef::Variant(v),
            Some(v) => return Err(AppError::NotFound(format!("variant {v}"))),
            None => StockRef::Product(product_id),
        };
        if !self.repo.set_stock(target, stock).await? {
            return Err(AppError::NotFound(format!("product {product_id}")));
        }
        self.repo
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))
    }
}
