//! In-memory storage. Units of work are serialised behind one async mutex and
//! operate on a working copy that replaces the shared state on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use crate::domain::aggregates::{
    Category, IntentStatus, LineItem, Order, OrderStatus, PaymentIntent, PriceSnapshot, Product, ProductStatus, Store, User,
};
use crate::domain::value_objects::InvoiceCode;
use crate::error::{MarketError, Result};
use super::{Catalog, Directory, OrderLedger, PaymentLedger, Storage, UnitOfWork};

#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    pub users: HashMap<Uuid, User>,
    /// address id -> owning user id
    pub addresses: HashMap<Uuid, Uuid>,
    pub stores: HashMap<Uuid, Store>,
    pub categories: HashMap<Uuid, Category>,
    pub products: HashMap<Uuid, Product>,
    pub snapshots: HashMap<Uuid, PriceSnapshot>,
    pub orders: HashMap<Uuid, Order>,
    pub intents: HashMap<Uuid, PaymentIntent>,
}

#[derive(Clone, Default)]
pub struct MemoryStorage { state: Arc<Mutex<MemoryState>> }

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    /// Copy of the committed state.
    pub async fn state(&self) -> MemoryState { self.state.lock().await.clone() }

    pub async fn insert_user(&self, user: User) { self.state.lock().await.users.insert(user.id, user); }
    pub async fn insert_address(&self, address_id: Uuid, owner_id: Uuid) { self.state.lock().await.addresses.insert(address_id, owner_id); }
    pub async fn insert_store(&self, store: Store) { self.state.lock().await.stores.insert(store.id, store); }
    pub async fn insert_category(&self, category: Category) { self.state.lock().await.categories.insert(category.id, category); }
    pub async fn insert_product(&self, product: Product) { self.state.lock().await.products.insert(product.id, product); }

    /// Applies a live edit outside any unit of work.
    pub async fn update_product(&self, id: Uuid, edit: impl FnOnce(&mut Product)) {
        if let Some(p) = self.state.lock().await.products.get_mut(&id) { edit(p); }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnitOfWork { guard, working })
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryUnitOfWork {
    fn product_mut(&mut self, id: Uuid) -> Result<&mut Product> {
        self.working.products.get_mut(&id).ok_or(MarketError::ProductNotFound(id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self) -> Result<()> {
        let MemoryUnitOfWork { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> { Ok(()) }
}

#[async_trait]
impl Directory for MemoryUnitOfWork {
    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>> { Ok(self.working.users.get(&id).cloned()) }

    async fn address_owned_by(&mut self, address_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self.working.addresses.get(&address_id) == Some(&user_id))
    }
}

#[async_trait]
impl Catalog for MemoryUnitOfWork {
    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>> { Ok(self.working.products.get(&id).cloned()) }

    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>> { self.get_product(id).await }

    async fn decrement_stock(&mut self, id: Uuid, qty: u32) -> Result<()> {
        let product = self.product_mut(id)?;
        if product.stock < i64::from(qty) {
            return Err(MarketError::InsufficientStock { product_id: id, requested: qty, available: product.stock });
        }
        product.stock -= i64::from(qty);
        Ok(())
    }

    async fn restore_stock(&mut self, id: Uuid, qty: u32) -> Result<()> {
        self.product_mut(id)?.stock += i64::from(qty);
        Ok(())
    }

    async fn increment_sold_count(&mut self, id: Uuid, qty: u32) -> Result<()> {
        self.product_mut(id)?.sold_count += i64::from(qty);
        Ok(())
    }

    async fn save_product_status(&mut self, product: &Product) -> Result<()> {
        let stored = self.product_mut(product.id)?;
        stored.status = product.status;
        stored.updated_at = product.updated_at;
        Ok(())
    }

    async fn get_store(&mut self, id: Uuid) -> Result<Option<Store>> { Ok(self.working.stores.get(&id).cloned()) }

    async fn get_store_by_owner(&mut self, owner_id: Uuid) -> Result<Option<Store>> {
        Ok(self.working.stores.values().find(|s| s.owner_id == owner_id).cloned())
    }

    async fn save_store_status(&mut self, store: &Store) -> Result<()> {
        let stored = self.working.stores.get_mut(&store.id).ok_or(MarketError::StoreNotFound)?;
        stored.status = store.status;
        stored.updated_at = store.updated_at;
        Ok(())
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>> { Ok(self.working.categories.get(&id).cloned()) }

    async fn category_has_active_product(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.working.products.values().any(|p| p.category_id == id && p.status == ProductStatus::Active))
    }

    async fn set_category_flag(&mut self, id: Uuid, has_active_product: bool) -> Result<()> {
        let category = self.working.categories.get_mut(&id).ok_or(MarketError::CategoryNotFound(id))?;
        category.has_active_product = has_active_product;
        Ok(())
    }
}

#[async_trait]
impl OrderLedger for MemoryUnitOfWork {
    async fn insert_snapshot(&mut self, snapshot: &PriceSnapshot) -> Result<()> {
        self.working.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn invoice_exists(&mut self, code: &InvoiceCode) -> Result<bool> {
        Ok(self.working.orders.values().any(|o| &o.invoice_code == code))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(MarketError::Storage(format!("duplicate order {}", order.id)));
        }
        let mut stored = order.clone();
        stored.items.clear();
        stored.events.clear();
        self.working.orders.insert(order.id, stored);
        Ok(())
    }

    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()> {
        if !self.working.snapshots.contains_key(&item.snapshot_id) {
            return Err(MarketError::Storage(format!("line item references unknown snapshot {}", item.snapshot_id)));
        }
        let order = self.working.orders.get_mut(&item.order_id).ok_or(MarketError::OrderNotFound(item.order_id))?;
        order.items.push(item.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>> { Ok(self.working.orders.get(&id).cloned()) }

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>> { self.get_order(id).await }

    async fn save_order_status(&mut self, order: &Order) -> Result<()> {
        let stored = self.working.orders.get_mut(&order.id).ok_or(MarketError::OrderNotFound(order.id))?;
        stored.status = order.status;
        stored.paid_at = order.paid_at;
        Ok(())
    }

    async fn stale_pending_orders(&mut self, created_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self.working.orders.values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < created_before)
            .map(|o| o.id)
            .collect())
    }
}

#[async_trait]
impl PaymentLedger for MemoryUnitOfWork {
    async fn get_intent(&mut self, id: Uuid) -> Result<Option<PaymentIntent>> { Ok(self.working.intents.get(&id).cloned()) }

    async fn lock_intent(&mut self, id: Uuid) -> Result<Option<PaymentIntent>> { self.get_intent(id).await }

    async fn pending_intent_for_order(&mut self, order_id: Uuid) -> Result<Option<PaymentIntent>> {
        Ok(self.working.intents.values().find(|i| i.order_id == order_id && i.is_pending()).cloned())
    }

    async fn insert_intent(&mut self, intent: &PaymentIntent) -> Result<()> {
        if intent.is_pending() && self.working.intents.values().any(|i| i.order_id == intent.order_id && i.is_pending()) {
            return Err(MarketError::Storage(format!("order {} already has a pending intent", intent.order_id)));
        }
        self.working.intents.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn save_intent(&mut self, intent: &PaymentIntent) -> Result<()> {
        let stored = self.working.intents.get_mut(&intent.id).ok_or(MarketError::IntentNotFound(intent.id))?;
        stored.status = intent.status;
        stored.gateway_ref = intent.gateway_ref.clone();
        stored.updated_at = intent.updated_at;
        Ok(())
    }

    async fn expire_pending_intents(&mut self, order_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut expired = 0;
        for intent in self.working.intents.values_mut().filter(|i| i.order_id == order_id && i.is_pending()) {
            intent.status = IntentStatus::Expired;
            intent.updated_at = now;
            expired += 1;
        }
        Ok(expired)
    }

    async fn expire_overdue_intents(&mut self, order_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut expired = 0;
        for intent in self.working.intents.values_mut().filter(|i| i.order_id == order_id && i.is_overdue(now)) {
            intent.status = IntentStatus::Expired;
            intent.updated_at = now;
            expired += 1;
        }
        Ok(expired)
    }

    async fn orders_with_overdue_intents(&mut self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.working.intents.values().filter(|i| i.is_overdue(now)).map(|i| i.order_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
