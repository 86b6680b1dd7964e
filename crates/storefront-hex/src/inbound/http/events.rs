//! Live order feed for store dashboards.
//!
//! Browsers cannot set headers on a websocket handshake, so the bearer
//! token travels as `?token=`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::OrderRepository;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use super::server::{parse_id, AppState};
use crate::errors::AppError;
use crate::outbound::dashboard::DashboardEvent;

#[derive(Deserialize)]
pub struct EventsQuery {
    pub token: String,
}

pub async fn store_events<R>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError>
where
    R: OrderRepository + CatalogRepository,
{
    let store_id = parse_id(&id)?;
    let caller = state.keys.verify(&query.token)?;
    state.catalog.get_store(&caller, store_id).await?;

    let rx = state.hub.subscribe();
    tracing::info!(%store_id, caller = %caller.user_id, "dashboard session opened");
    Ok(ws.on_upgrade(move |socket| session(socket, rx, store_id)))
}

async fn session(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<DashboardEvent>,
    store_id: Uuid,
) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) if event.store_id == store_id => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode dashboard event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(%store_id, missed, "dashboard session lagging");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!(%store_id, "dashboard session closed");
}
