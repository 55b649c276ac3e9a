//! HTTP surface
//!
//! Callers identify themselves with the `x-user-id` header; token issuance and
//! admin authentication happen upstream of this service.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{Order, PaymentIntent, Product, Store};
use crate::domain::value_objects::Quantity;
use crate::error::Result;
use crate::repository::Storage;
use crate::services::{Marketplace, OrderLine};

pub mod error;
pub mod extract;

pub use extract::{JsonBody, PathId};

pub const USER_HEADER: &str = "x-user-id";

/// Authenticated caller id.
#[derive(Clone, Copy, Debug)]
pub struct Caller(pub Uuid);

#[async_trait]
impl<T: Send + Sync> FromRequestParts<T> for Caller {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &T) -> std::result::Result<Self, Self::Rejection> {
        parts.headers.get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Caller)
            .ok_or((StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized", "message": "missing or malformed x-user-id"}))))
    }
}

pub fn router<S: Storage>(market: Marketplace<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "opensase-marketplace"})) }))
        .route("/api/v1/orders", post(create_order::<S>))
        .route("/api/v1/orders/:id", get(get_order::<S>))
        .route("/api/v1/orders/:id/cancel", post(cancel_order::<S>))
        .route("/api/v1/orders/:id/payment-intents", post(create_intent::<S>))
        .route("/api/v1/payments/callback", post(payment_callback::<S>))
        .route("/api/v1/admin/payment-intents/:id/simulate", post(simulate_payment::<S>))
        .route("/api/v1/products/:id/activate", post(activate_product::<S>))
        .route("/api/v1/products/:id/deactivate", post(deactivate_product::<S>))
        .route("/api/v1/admin/products/:id/suspend", post(suspend_product::<S>))
        .route("/api/v1/admin/products/:id/unsuspend", post(unsuspend_product::<S>))
        .route("/api/v1/stores/mine/activate", post(activate_my_store::<S>))
        .route("/api/v1/stores/mine/deactivate", post(deactivate_my_store::<S>))
        .route("/api/v1/admin/stores/:id/approve", post(approve_store::<S>))
        .route("/api/v1/admin/stores/:id/reject", post(reject_store::<S>))
        .route("/api/v1/admin/stores/:id/suspend", post(suspend_store::<S>))
        .route("/api/v1/admin/stores/:id/unsuspend", post(unsuspend_store::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(market)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub shipping_address_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: String,
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemRequest { pub product_id: Uuid, pub quantity: u32 }

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIntentRequest {
    #[validate(length(min = 1, max = 50))]
    pub payment_method: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus { Success, Failed }

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentCallback {
    pub intent_id: Uuid,
    pub status: CallbackStatus,
    #[validate(length(min = 1, max = 255))]
    pub gateway_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest { pub status: CallbackStatus }

async fn create_order<S: Storage>(State(m): State<Marketplace<S>>, Caller(buyer): Caller, JsonBody(r): JsonBody<CreateOrderRequest>) -> Result<(StatusCode, Json<Order>)> {
    r.validate()?;
    let lines = r.items.iter()
        .map(|i| -> Result<OrderLine> { Ok(OrderLine { product_id: i.product_id, quantity: Quantity::new(i.quantity)? }) })
        .collect::<Result<Vec<_>>>()?;
    let order = m.create_order(buyer, r.shipping_address_id, &r.payment_method, &lines).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order<S: Storage>(State(m): State<Marketplace<S>>, Caller(buyer): Caller, PathId(id): PathId) -> Result<Json<Order>> {
    m.get_order(buyer, id).await.map(Json)
}

async fn cancel_order<S: Storage>(State(m): State<Marketplace<S>>, Caller(buyer): Caller, PathId(id): PathId) -> Result<Json<Order>> {
    m.cancel_order(buyer, id).await.map(Json)
}

async fn create_intent<S: Storage>(State(m): State<Marketplace<S>>, Caller(buyer): Caller, PathId(id): PathId, JsonBody(r): JsonBody<CreateIntentRequest>) -> Result<(StatusCode, Json<PaymentIntent>)> {
    r.validate()?;
    let intent = m.create_intent(buyer, id, &r.payment_method).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

async fn payment_callback<S: Storage>(State(m): State<Marketplace<S>>, JsonBody(r): JsonBody<PaymentCallback>) -> Result<Json<PaymentIntent>> {
    r.validate()?;
    let intent = match r.status {
        CallbackStatus::Success => m.process_success(r.intent_id, r.gateway_ref, r.paid_at).await?,
        CallbackStatus::Failed => m.process_failed(r.intent_id, r.gateway_ref).await?,
    };
    Ok(Json(intent))
}

async fn simulate_payment<S: Storage>(State(m): State<Marketplace<S>>, PathId(id): PathId, JsonBody(r): JsonBody<SimulateRequest>) -> Result<Json<PaymentIntent>> {
    let gateway_ref = Some(format!("SIM-{}", Uuid::new_v4().simple()));
    let intent = match r.status {
        CallbackStatus::Success => m.process_success(id, gateway_ref, None).await?,
        CallbackStatus::Failed => m.process_failed(id, gateway_ref).await?,
    };
    Ok(Json(intent))
}

async fn activate_product<S: Storage>(State(m): State<Marketplace<S>>, Caller(owner): Caller, PathId(id): PathId) -> Result<Json<Product>> {
    m.activate_product(owner, id).await.map(Json)
}

async fn deactivate_product<S: Storage>(State(m): State<Marketplace<S>>, Caller(owner): Caller, PathId(id): PathId) -> Result<Json<Product>> {
    m.deactivate_product(owner, id).await.map(Json)
}

async fn suspend_product<S: Storage>(State(m): State<Marketplace<S>>, PathId(id): PathId) -> Result<Json<Product>> {
    m.suspend_product(id).await.map(Json)
}

async fn unsuspend_product<S: Storage>(State(m): State<Marketplace<S>>, PathId(id): PathId) -> Result<Json<Product>> {
    m.unsuspend_product(id).await.map(Json)
}

async fn activate_my_store<S: Storage>(State(m): State<Marketplace<S>>, Caller(owner): Caller) -> Result<Json<Store>> {
    m.activate_my_store(owner).await.map(Json)
}

async fn deactivate_my_store<S: Storage>(State(m): State<Marketplace<S>>, Caller(owner): Caller) -> Result<Json<Store>> {
    m.deactivate_my_store(owner).await.map(Json)
}

async fn approve_store<S: Storage>(State(m): State<Marketplace<S>>, PathId(id): PathId) -> Result<Json<Store>> {
    m.approve_store(id).await.map(Json)
}

async fn reject_store<S: Storage>(State(m): State<Marketplace<S>>, PathId(id): PathId) -> Result<Json<Store>> {
    m.reject_store(id).await.map(Json)
}

async fn suspend_store<S: Storage>(State(m): State<Marketplace<S>>, PathId(id): PathId) -> Result<Json<Store>> {
    m.suspend_store(id).await.map(Json)
}

async fn unsuspend_store<S: Storage>(State(m): State<Marketplace<S>>, PathId(id): PathId) -> Result<Json<Store>> {
    m.unsuspend_store(id).await.map(Json)
}
