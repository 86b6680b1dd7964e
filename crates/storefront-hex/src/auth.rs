//! Bearer-token identity and the default store authorization policy.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storefront_types::domain::caller::{Caller, Role};
use storefront_types::domain::order::Order;
use storefront_types::domain::store::Store;
use storefront_types::ports::authorizer::Authorizer;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, caller: Caller, ttl: Duration) -> anyhow::Result<String> {
        let exp = chrono::Utc::now() + chrono::Duration::from_std(ttl)?;
        let claims = Claims {
            sub: caller.user_id,
            role: caller.role,
            exp: exp.timestamp() as usize,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Caller, AppError> {
        let data = decode::<Claims>(
            token,
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("token expired".into())
            }
            _ => AppError::Unauthorized("invalid token".into()),
        })?;
        Ok(Caller::new(data.claims.sub, data.claims.role))
    }
}

/// Extracts the caller from `Authorization: Bearer <token>`.
pub struct AuthCaller(pub Caller);

impl<S> FromRequestParts<S> for AuthCaller
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("expected bearer token".into()))?;
        let keys = JwtKeys::from_ref(state);
        keys.verify(token.trim()).map(AuthCaller)
    }
}

/// Super admins manage everything; otherwise the store owner and the
/// store's listed admins do. Customers never transition orders, and may
/// only upload proof for an order placed from their own chat.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreRoleAuthorizer;

impl Authorizer for StoreRoleAuthorizer {
    fn can_transition(&self, caller: &Caller, store: &Store, order: &Order) -> bool {
        order.store_id == store.id && self.can_manage_store(caller, store)
    }

    fn can_manage_store(&self, caller: &Caller, store: &Store) -> bool {
        match caller.role {
            Role::SuperAdmin => true,
            Role::Admin => store.is_managed_by(caller.user_id),
            Role::Customer => false,
        }
    }

    fn can_submit_proof(
        &self,
        caller: &Caller,
        store: &Store,
        order: &Order,
        telegram_chat_id: Option<i64>,
    ) -> bool {
        if order.store_id != store.id {
            return false;
        }
        match caller.role {
            Role::Customer => telegram_chat_id == Some(order.customer.telegram_chat_id),
            _ => self.can_manage_store(caller, store),
        }
    }
}
