//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::PriceSnapshot;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{InvoiceCode, Money, Quantity};
use crate::error::{MarketError, Result};

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub shipping_address_id: Uuid,
    pub invoice_code: InvoiceCode,
    pub payment_method: String,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub items: Vec<LineItem>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

/// One immutable order line, priced from a frozen snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub snapshot_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub subtotal: Money,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Paid, Failed, Cancelled }

text_status!(OrderStatus { Pending => "pending", Paid => "paid", Failed => "failed", Cancelled => "cancelled" });

impl LineItem {
    pub fn from_snapshot(snapshot: &PriceSnapshot, quantity: Quantity) -> Self {
        let unit_price = snapshot.unit_price();
        Self {
            id: Uuid::now_v7(), order_id: Uuid::nil(), snapshot_id: snapshot.id, product_id: snapshot.product_id,
            product_name: snapshot.name.clone(), quantity, unit_price, subtotal: unit_price.multiply(quantity),
        }
    }
}

impl Order {
    /// Builds a pending order owning `items`; the total is fixed here and never recomputed.
    pub fn place(
        buyer_id: Uuid, shipping_address_id: Uuid, payment_method: impl Into<String>, invoice_code: InvoiceCode,
        mut items: Vec<LineItem>, now: DateTime<Utc>,
    ) -> Result<Self> {
        if items.is_empty() { return Err(MarketError::Validation("order has no items".into())); }
        let id = Uuid::now_v7();
        for item in &mut items { item.order_id = id; }
        let total = items.iter().map(|i| i.subtotal).sum();
        let mut order = Self {
            id, buyer_id, shipping_address_id, invoice_code, payment_method: payment_method.into(), total,
            status: OrderStatus::Pending, created_at: now, paid_at: None, items, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, buyer_id, total }));
        Ok(order)
    }

    pub fn is_pending(&self) -> bool { self.status == OrderStatus::Pending }

    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = OrderStatus::Paid;
        self.paid_at = Some(at);
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id, paid_at: at }));
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = OrderStatus::Failed;
        self.raise_event(DomainEvent::Order(OrderEvent::Failed { order_id: self.id }));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = OrderStatus::Cancelled;
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn ensure_pending(&self) -> Result<()> {
        if self.is_pending() { Ok(()) } else { Err(MarketError::OrderNotPending) }
    }
}
