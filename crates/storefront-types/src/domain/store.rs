use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant boundary: owns products, orders and its bot credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    #[serde(default)]
    pub admin_ids: Vec<Uuid>,
    pub currency: String,
    #[serde(default, skip_serializing)]
    pub bot_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn new(
        name: String,
        owner_id: Uuid,
        currency: String,
        bot_token: Option<String>,
    ) -> anyhow::Result<Self> {
        if name.trim().is_empty() {
            anyhow::bail!("store name empty");
        }
        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            anyhow::bail!("currency must be a 3-letter code");
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            owner_id,
            admin_ids: Vec::new(),
            currency,
            bot_token: bot_token.filter(|t| !t.trim().is_empty()),
            created_at: Utc::now(),
        })
    }

    pub fn is_managed_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.admin_ids.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub price_cents: Option<i64>,
    pub stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    #[serde(default)]
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    #[serde(default)]
    pub price_cents: Option<i64>,
    pub stock: i64,
}

impl Product {
    pub fn new(
        store_id: Uuid,
        name: String,
        price_cents: i64,
        stock: i64,
        variants: Vec<NewVariant>,
    ) -> anyhow::Result<Self> {
        if name.trim().is_empty() {
            anyhow::bail!("product name empty");
        }
        if price_cents < 0 {
            anyhow::bail!("price must not be negative");
        }
        if stock < 0 {
            anyhow::bail!("stock must not be negative");
        }
        let id = Uuid::new_v4();
        let mut built = Vec::with_capacity(variants.len());
        for v in variants {
            if v.name.trim().is_empty() {
                anyhow::bail!("variant name empty");
            }
            if v.stock < 0 || v.price_cents.is_some_and(|p| p < 0) {
                anyhow::bail!("variant {} has negative stock or price", v.name);
            }
            built.push(Variant {
                id: Uuid::new_v4(),
                product_id: id,
                name: v.name,
                price_cents: v.price_cents,
                stock: v.stock,
            });
        }
        let now = Utc::now();
        Ok(Self {
            id,
            store_id,
            name,
            price_cents,
            stock,
            variants: built,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn variant(&self, id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Price for a line, resolved at checkout time.
    pub fn unit_price(&self, variant_id: Option<Uuid>) -> Option<i64> {
        match variant_id {
            None => Some(self.price_cents),
            Some(id) => self
                .variant(id)
                .map(|v| v.price_cents.unwrap_or(self.price_cents)),
        }
    }

    pub fn line_name(&self, variant_id: Option<Uuid>) -> String {
        match variant_id.and_then(|id| self.variant(id)) {
            Some(v) => format!("{} ({})", self.name, v.name),
            None => self.name.clone(),
        }
    }
}
