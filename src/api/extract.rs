//! Request extractors that report malformed input through [`MarketError`]
//! instead of axum's plain-text rejections.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use crate::error::MarketError;

/// JSON request body.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = MarketError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state).await
            .map(|Json(value)| JsonBody(value))
            .map_err(|rejection| MarketError::Validation(rejection.body_text()))
    }
}

/// The `:id` path segment of a resource route.
#[derive(Clone, Copy, Debug)]
pub struct PathId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PathId {
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<Uuid>::from_request_parts(parts, state).await
            .map(|Path(id)| PathId(id))
            .map_err(|rejection| MarketError::Validation(rejection.body_text()))
    }
}
