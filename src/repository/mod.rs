//! Unit of work and the narrow repository contracts the core consumes.
//!
//! Every operation runs inside one [`UnitOfWork`] obtained from a [`Storage`].
//! Dropping a unit of work without calling [`UnitOfWork::commit`] discards all
//! of its writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::domain::aggregates::{Category, LineItem, Order, PaymentIntent, PriceSnapshot, Product, Store, User};
use crate::domain::value_objects::InvoiceCode;
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    type Uow: UnitOfWork;
    async fn begin(&self) -> Result<Self::Uow>;
}

#[async_trait]
pub trait UnitOfWork: Directory + Catalog + OrderLedger + PaymentLedger + Send {
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// Users and addresses.
#[async_trait]
pub trait Directory: Send {
    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>>;
    async fn address_owned_by(&mut self, address_id: Uuid, user_id: Uuid) -> Result<bool>;
}

/// Products, stores and categories.
#[async_trait]
pub trait Catalog: Send {
    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>>;
    /// Reads the product under an exclusive row lock held until the unit of work ends.
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>>;
    async fn decrement_stock(&mut self, id: Uuid, qty: u32) -> Result<()>;
    async fn restore_stock(&mut self, id: Uuid, qty: u32) -> Result<()>;
    async fn increment_sold_count(&mut self, id: Uuid, qty: u32) -> Result<()>;
    async fn save_product_status(&mut self, product: &Product) -> Result<()>;

    async fn get_store(&mut self, id: Uuid) -> Result<Option<Store>>;
    async fn get_store_by_owner(&mut self, owner_id: Uuid) -> Result<Option<Store>>;
    async fn save_store_status(&mut self, store: &Store) -> Result<()>;

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>>;
    async fn category_has_active_product(&mut self, id: Uuid) -> Result<bool>;
    async fn set_category_flag(&mut self, id: Uuid, has_active_product: bool) -> Result<()>;
}

/// Orders, line items and price snapshots.
#[async_trait]
pub trait OrderLedger: Send {
    async fn insert_snapshot(&mut self, snapshot: &PriceSnapshot) -> Result<()>;
    async fn invoice_exists(&mut self, code: &InvoiceCode) -> Result<bool>;
    async fn insert_order(&mut self, order: &Order) -> Result<()>;
    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()>;
    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>>;
    /// Reads the order and its line items under an exclusive lock on the order row.
    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>>;
    async fn save_order_status(&mut self, order: &Order) -> Result<()>;
    async fn stale_pending_orders(&mut self, created_before: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

/// Payment intents.
#[async_trait]
pub trait PaymentLedger: Send {
    async fn get_intent(&mut self, id: Uuid) -> Result<Option<PaymentIntent>>;
    async fn lock_intent(&mut self, id: Uuid) -> Result<Option<PaymentIntent>>;
    async fn pending_intent_for_order(&mut self, order_id: Uuid) -> Result<Option<PaymentIntent>>;
    async fn insert_intent(&mut self, intent: &PaymentIntent) -> Result<()>;
    async fn save_intent(&mut self, intent: &PaymentIntent) -> Result<()>;
    /// Moves every pending intent of the order to `expired`; returns how many moved.
    async fn expire_pending_intents(&mut self, order_id: Uuid, now: DateTime<Utc>) -> Result<u64>;
    /// Moves only the order's pending intents with `expires_at <= now` to `expired`.
    async fn expire_overdue_intents(&mut self, order_id: Uuid, now: DateTime<Utc>) -> Result<u64>;
    async fn orders_with_overdue_intents(&mut self, now: DateTime<Utc>) -> Result<Vec<Uuid>>;
}
