//! Domain events
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{ProductStatus, StoreStatus};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
    Product(ProductEvent),
    Store(StoreEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, buyer_id: Uuid, total: Money },
    Paid { order_id: Uuid, paid_at: DateTime<Utc> },
    Failed { order_id: Uuid },
    Cancelled { order_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    IntentCreated { intent_id: Uuid, order_id: Uuid },
    IntentExpired { order_id: Uuid, count: u64 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    StatusChanged { product_id: Uuid, category_id: Uuid, status: ProductStatus },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    StatusChanged { store_id: Uuid, status: StoreStatus },
}

impl DomainEvent {
    /// Dotted subject suffix, e.g. `order.paid`.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Order(OrderEvent::Placed { .. }) => "order.placed",
            DomainEvent::Order(OrderEvent::Paid { .. }) => "order.paid",
            DomainEvent::Order(OrderEvent::Failed { .. }) => "order.failed",
            DomainEvent::Order(OrderEvent::Cancelled { .. }) => "order.cancelled",
            DomainEvent::Payment(PaymentEvent::IntentCreated { .. }) => "payment.intent_created",
            DomainEvent::Payment(PaymentEvent::IntentExpired { .. }) => "payment.intent_expired",
            DomainEvent::Product(ProductEvent::StatusChanged { .. }) => "product.status_changed",
            DomainEvent::Store(StoreEvent::StatusChanged { .. }) => "store.status_changed",
        }
    }
}
