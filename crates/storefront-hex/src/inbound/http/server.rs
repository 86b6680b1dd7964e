use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    serve, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storefront_types::domain::order::{Customer, Order, OrderStatus};
use storefront_types::domain::store::{Product, Store};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::OrderRepository;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::events::store_events;
use crate::application::catalog_service::{CatalogService, NewProduct, NewStore};
use crate::application::order_service::{CheckoutLine, OrderService, TransitionReport};
use crate::auth::{AuthCaller, JwtKeys};
use crate::errors::AppError;
use crate::outbound::dashboard::DashboardHub;

#[derive(Clone)]
pub struct HttpServerConfig {
    pub port: String,
}

pub struct AppState<R>
where
    R: OrderRepository + CatalogRepository,
{
    pub orders: Arc<OrderService<R>>,
    pub catalog: Arc<CatalogService<R>>,
    pub keys: JwtKeys,
    pub hub: DashboardHub,
}

impl<R> Clone for AppState<R>
where
    R: OrderRepository + CatalogRepository,
{
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            catalog: self.catalog.clone(),
            keys: self.keys.clone(),
            hub: self.hub.clone(),
        }
    }
}

impl<R> FromRef<AppState<R>> for JwtKeys
where
    R: OrderRepository + CatalogRepository,
{
    fn from_ref(state: &AppState<R>) -> Self {
        state.keys.clone()
    }
}

pub struct HttpServer<R>
where
    R: OrderRepository + CatalogRepository,
{
    pub state: AppState<R>,
    pub config: HttpServerConfig,
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub customer: Customer,
    pub items: Vec<CheckoutLine>,
}

#[derive(Serialize)]
struct CheckoutResponse {
    id: String,
    status: OrderStatus,
    total_cents: i64,
    currency: String,
}

impl From<Order> for CheckoutResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id.to_string(),
            status: o.status,
            total_cents: o.total_cents,
            currency: o.currency,
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub approve: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentProofRequest {
    pub proof: String,
    #[serde(default)]
    pub telegram_chat_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct SetStockRequest {
    #[serde(default)]
    pub variant_id: Option<Uuid>,
    pub stock: i64,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub status: Option<String>,
}

pub(super) fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

impl<R> HttpServer<R>
where
    R: OrderRepository + CatalogRepository,
{
    pub async fn new(
        orders: OrderService<R>,
        catalog: CatalogService<R>,
        keys: JwtKeys,
        hub: DashboardHub,
        config: HttpServerConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            state: AppState {
                orders: Arc::new(orders),
                catalog: Arc::new(catalog),
                keys,
                hub,
            },
            config,
        })
    }

    pub fn router(&self) -> Router {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http_request",
                    %request_id,
                    method = %request.method(),
                    uri
                )
            })
            .on_request(
                |request: &axum::extract::Request<_>, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        method = %request.method(),
                        uri = %request.uri(),
                        "request"
                    );
                },
            )
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        status = %response.status(),
                        latency_ms = %latency.as_millis(),
                        "response"
                    );
                },
            );

        Router::new()
            .route("/health", get(health))
            .route("/stores", post(create_store::<R>))
            .route("/stores/{id}", get(get_store::<R>))
            .route("/stores/{id}/products", post(create_product::<R>))
            .route("/stores/{id}/products", get(list_products::<R>))
            .route("/stores/{id}/orders", post(checkout::<R>))
            .route("/stores/{id}/orders", get(list_orders::<R>))
            .route("/stores/{id}/events", get(store_events::<R>))
            .route("/products/{id}", delete(delete_product::<R>))
            .route("/products/{id}/stock", patch(set_stock::<R>))
            .route("/orders/{id}", get(get_order::<R>))
            .route("/orders/{id}/payment-proof", put(attach_payment_proof::<R>))
            .route("/orders/{id}/verify", post(verify_payment::<R>))
            .route("/orders/{id}/status", patch(update_status::<R>))
            .layer(trace_layer)
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse()?;
        tracing::info!("starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn create_store<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Json(payload): Json<NewStore>,
) -> Result<(StatusCode, Json<Store>), AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let store = state.catalog.create_store(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(store)))
}

async fn get_store<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> Result<Json<Store>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let store = state.catalog.get_store(&caller, parse_id(&id)?).await?;
    Ok(Json(store))
}

async fn create_product<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(payload): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let product = state
        .catalog
        .create_product(&caller, parse_id(&id)?, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_products<R>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Product>>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    Ok(Json(state.catalog.list_products(parse_id(&id)?).await?))
}

async fn delete_product<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    state.catalog.delete_product(&caller, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_stock<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(payload): Json<SetStockRequest>,
) -> Result<Json<Product>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let product = state
        .catalog
        .set_stock(&caller, parse_id(&id)?, payload.variant_id, payload.stock)
        .await?;
    Ok(Json(product))
}

async fn checkout<R>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let order = state
        .orders
        .checkout(parse_id(&id)?, payload.customer, payload.items)
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

async fn list_orders<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let list = state
        .orders
        .list_orders(&caller, parse_id(&id)?, status)
        .await?;
    Ok(Json(list))
}

async fn get_order<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let order = state.orders.get_order(&caller, parse_id(&id)?).await?;
    Ok(Json(order))
}

async fn attach_payment_proof<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(payload): Json<PaymentProofRequest>,
) -> Result<Json<Order>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let order = state
        .orders
        .attach_payment_proof(
            &caller,
            parse_id(&id)?,
            payload.proof,
            payload.telegram_chat_id,
        )
        .await?;
    Ok(Json(order))
}

async fn verify_payment<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<TransitionReport>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let id = parse_id(&id)?;
    let report = if payload.approve {
        state.orders.confirm_payment(&caller, id).await?
    } else {
        state
            .orders
            .reject_payment(&caller, id, payload.reason)
            .await?
    };
    Ok(Json(report))
}

async fn update_status<R>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<TransitionReport>, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let report = state
        .orders
        .transition(&caller, parse_id(&id)?, payload.status, payload.reason)
        .await?;
    Ok(Json(report))
}
