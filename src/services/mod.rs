//! Fulfillment core operations.
//!
//! [`Marketplace`] is the single entry point; its operations are spread over
//! the submodules by component.

use chrono::Duration;
use std::sync::Arc;
use tracing::warn;
use crate::clock::Clock;
use crate::repository::{Storage, UnitOfWork};
use crate::error::Result;
use crate::worker::EventSink;

pub mod inventory;
pub mod listing;
pub mod order_assembler;
pub mod payments;

pub use order_assembler::OrderLine;

#[derive(Clone, Copy, Debug)]
pub struct MarketSettings {
    /// Lifetime of a pending payment intent.
    pub intent_ttl: Duration,
    /// How long a pending order may hold reserved stock.
    pub reservation_ttl: Duration,
}

impl Default for MarketSettings {
    fn default() -> Self { Self { intent_ttl: Duration::minutes(30), reservation_ttl: Duration::hours(24) } }
}

#[derive(Clone)]
pub struct Marketplace<S: Storage> {
    storage: S,
    clock: Arc<dyn Clock>,
    events: EventSink,
    settings: MarketSettings,
}

impl<S: Storage> Marketplace<S> {
    pub fn new(storage: S, clock: Arc<dyn Clock>, events: EventSink, settings: MarketSettings) -> Self {
        Self { storage, clock, events, settings }
    }

    pub fn storage(&self) -> &S { &self.storage }
    pub fn settings(&self) -> MarketSettings { self.settings }
}

/// Commits on success, rolls back on failure, and hands back the operation's result.
pub(crate) async fn finish<U: UnitOfWork, T>(uow: U, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    //! Seeded in-memory marketplace shared by the service tests.

    use super::*;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use uuid::Uuid;
    use crate::clock::ManualClock;
    use crate::domain::aggregates::{Category, CategoryStatus, Product, ProductStatus, Store, StoreStatus, User};
    use crate::domain::events::DomainEvent;
    use crate::domain::value_objects::Money;
    use crate::repository::MemoryStorage;

    pub struct Fixture {
        pub market: Marketplace<MemoryStorage>,
        pub storage: MemoryStorage,
        pub clock: Arc<ManualClock>,
        pub events: mpsc::Receiver<DomainEvent>,
        pub buyer: Uuid,
        pub address: Uuid,
        pub seller: Uuid,
        pub store: Uuid,
        pub category: Uuid,
    }

    impl Fixture {
        pub async fn new() -> Self {
            let storage = MemoryStorage::new();
            let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
            let (sink, events) = EventSink::channel(256);
            let market = Marketplace::new(storage.clone(), clock.clone(), sink, MarketSettings::default());

            let (buyer, seller, address) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
            storage.insert_user(User { id: buyer, name: "Buyer".into(), email: "buyer@example.com".into() }).await;
            storage.insert_user(User { id: seller, name: "Seller".into(), email: "seller@example.com".into() }).await;
            storage.insert_address(address, buyer).await;

            let store = Store { id: Uuid::new_v4(), owner_id: seller, name: "Shop".into(), status: StoreStatus::Active, updated_at: Utc::now(), events: vec![] };
            let category = Category { id: Uuid::new_v4(), name: "Phones".into(), status: CategoryStatus::Active, is_leaf: true, has_active_product: false };
            let (store_id, category_id) = (store.id, category.id);
            storage.insert_store(store).await;
            storage.insert_category(category).await;

            Self { market, storage, clock, events, buyer, address, seller, store: store_id, category: category_id }
        }

        pub async fn product(&self, name: &str, price: i64, stock: i64, status: ProductStatus) -> Uuid {
            let product = Product {
                id: Uuid::new_v4(), store_id: self.store, category_id: self.category, name: name.into(),
                slug: name.to_lowercase().replace(' ', "-"), description: format!("{name} description"),
                price: Money::from_major(price), discount_price: None, stock, sold_count: 0, status,
                updated_at: Utc::now(), events: vec![],
            };
            let id = product.id;
            self.storage.insert_product(product).await;
            id
        }

        pub async fn active_product(&self, name: &str, price: i64, stock: i64) -> Uuid {
            self.product(name, price, stock, ProductStatus::Active).await
        }

        pub fn drain_events(&mut self) -> Vec<DomainEvent> {
            let mut out = vec![];
            while let Ok(e) = self.events.try_recv() { out.push(e); }
            out
        }
    }
}
