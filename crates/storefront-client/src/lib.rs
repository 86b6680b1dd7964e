use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use storefront_types::domain::inventory::AdjustmentReport;
use storefront_types::domain::order::{Customer, Order, OrderStatus};
use storefront_types::domain::store::{NewVariant, Product, Store};
use uuid::Uuid;

#[derive(Clone)]
pub struct StorefrontClientBuilder {
    base: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

/// Typed client for the storefront HTTP API.
#[derive(Clone)]
pub struct StorefrontClient {
    base: Url,
    client: reqwest::Client,
}

/// Error body returned by the server. Failed calls carry it inside the
/// `anyhow::Error`, so callers can `downcast_ref::<ApiError>()`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

async fn ensure_success(res: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let err = match res.json::<ErrorBody>().await {
        Ok(body) => ApiError {
            status: status.as_u16(),
            code: body.code,
            message: body.error,
        },
        Err(_) => ApiError {
            status: status.as_u16(),
            code: "UNKNOWN".into(),
            message: status.to_string(),
        },
    };
    tracing::debug!(status = err.status, code = %err.code, "storefront api error");
    Err(err.into())
}

impl StorefrontClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::builder(base_url)?.build()
    }

    pub fn builder(base_url: &str) -> anyhow::Result<StorefrontClientBuilder> {
        let base = Url::parse(base_url).context("invalid base url")?;
        Ok(StorefrontClientBuilder {
            base,
            headers: HeaderMap::new(),
            timeout: None,
            client: None,
        })
    }

    fn url(&self, path: &str) -> anyhow::Result<Url> {
        self.base.join(path).context("failed to join url")
    }

    pub async fn create_store(&self, req: &CreateStoreRequest) -> anyhow::Result<Store> {
        let res = self
            .client
            .post(self.url("stores")?)
            .json(req)
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    pub async fn create_product(
        &self,
        store_id: Uuid,
        req: &CreateProductRequest,
    ) -> anyhow::Result<Product> {
        let res = self
            .client
            .post(self.url(&format!("stores/{store_id}/products"))?)
            .json(req)
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    pub async fn list_products(&self, store_id: Uuid) -> anyhow::Result<Vec<Product>> {
        let res = self
            .client
            .get(self.url(&format!("stores/{store_id}/products"))?)
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    pub async fn checkout(
        &self,
        store_id: Uuid,
        req: &CheckoutRequest,
    ) -> anyhow::Result<CheckoutResponse> {
        let res = self
            .client
            .post(self.url(&format!("stores/{store_id}/orders"))?)
            .json(req)
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    pub async fn get_order(&self, id: Uuid) -> anyhow::Result<Order> {
        let res = self
            .client
            .get(self.url(&format!("orders/{id}"))?)
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    pub async fn list_orders(
        &self,
        store_id: Uuid,
        status: Option<OrderStatus>,
    ) -> anyhow::Result<Vec<Order>> {
        let mut url = self.url(&format!("stores/{store_id}/orders"))?;
        if let Some(status) = status {
            url.query_pairs_mut().append_pair("status", status.as_str());
        }
        let res = self.client.get(url).send().await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    /// Uploads proof for a pending order. Customer tokens must pass the
    /// chat the order was placed from.
    pub async fn attach_payment_proof(
        &self,
        id: Uuid,
        proof: &str,
        telegram_chat_id: Option<i64>,
    ) -> anyhow::Result<Order> {
        let res = self
            .client
            .put(self.url(&format!("orders/{id}/payment-proof"))?)
            .json(&PaymentProofRequest {
                proof,
                telegram_chat_id,
            })
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    /// Approves (`PAID`) or rejects (`REJECTED`) a pending payment.
    pub async fn verify_payment(
        &self,
        id: Uuid,
        approve: bool,
        reason: Option<&str>,
    ) -> anyhow::Result<TransitionResponse> {
        let res = self
            .client
            .post(self.url(&format!("orders/{id}/verify"))?)
            .json(&VerifyRequest { approve, reason })
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        reason: Option<&str>,
    ) -> anyhow::Result<TransitionResponse> {
        let res = self
            .client
            .patch(self.url(&format!("orders/{id}/status"))?)
            .json(&UpdateStatusRequest { status, reason })
            .send()
            .await?;
        Ok(ensure_success(res).await?.json().await?)
    }
}

impl StorefrontClientBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(
        mut self,
        key: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let header_name =
            HeaderName::from_bytes(key.as_ref().as_bytes()).context("invalid header name")?;
        let header_value = HeaderValue::from_str(value.as_ref()).context("invalid header value")?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn with_bearer_token(mut self, token: impl AsRef<str>) -> anyhow::Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_ref()))
            .context("invalid bearer token")?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn with_reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> anyhow::Result<StorefrontClient> {
        if let Some(client) = self.client {
            return Ok(StorefrontClient {
                base: self.base,
                client,
            });
        }

        let mut builder = reqwest::Client::builder();
        if !self.headers.is_empty() {
            builder = builder.default_headers(self.headers);
        }
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        Ok(StorefrontClient {
            base: self.base,
            client,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateStoreRequest {
    pub name: String,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub admin_ids: Vec<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    #[serde(default)]
    pub variants: Vec<NewVariant>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<Uuid>,
    pub qty: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: Customer,
    pub items: Vec<CheckoutLine>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckoutResponse {
    pub id: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationSummary {
    /// `delivered`, `degraded` or `delayed`.
    pub status: String,
    #[serde(default)]
    pub channels: Vec<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransitionResponse {
    pub order: Order,
    pub inventory: AdjustmentReport,
    pub notifications: NotificationSummary,
}

#[derive(Serialize)]
struct PaymentProofRequest<'a> {
    proof: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    telegram_chat_id: Option<i64>,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    approve: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Serialize)]
struct UpdateStatusRequest<'a> {
    status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}
