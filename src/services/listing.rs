//! Listing Lifecycle: product and store visibility transitions.

use tracing::{info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{Category, Product, Store};
use crate::error::{MarketError, Result};
use crate::repository::{Catalog, Storage};
use super::{finish, Marketplace};

type ProductTransition = fn(&mut Product, &Store, &Category) -> Result<()>;
type StoreTransition = fn(&mut Store) -> Result<()>;

/// Who is asking for a transition. Admin calls bypass ownership checks.
#[derive(Clone, Copy, Debug)]
enum Actor {
    Owner(Uuid),
    Admin,
}

impl<S: Storage> Marketplace<S> {
    #[instrument(skip(self))]
    pub async fn activate_product(&self, owner_id: Uuid, product_id: Uuid) -> Result<Product> {
        self.transition_product(Actor::Owner(owner_id), product_id, Product::activate).await
    }

    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, owner_id: Uuid, product_id: Uuid) -> Result<Product> {
        self.transition_product(Actor::Owner(owner_id), product_id, |p, _, _| p.deactivate()).await
    }

    #[instrument(skip(self))]
    pub async fn suspend_product(&self, product_id: Uuid) -> Result<Product> {
        self.transition_product(Actor::Admin, product_id, |p, _, _| p.suspend()).await
    }

    #[instrument(skip(self))]
    pub async fn unsuspend_product(&self, product_id: Uuid) -> Result<Product> {
        self.transition_product(Actor::Admin, product_id, |p, _, _| p.unsuspend()).await
    }

    pub async fn approve_store(&self, store_id: Uuid) -> Result<Store> {
        self.transition_store(Actor::Admin, store_id, Store::approve).await
    }

    pub async fn reject_store(&self, store_id: Uuid) -> Result<Store> {
        self.transition_store(Actor::Admin, store_id, Store::reject).await
    }

    pub async fn suspend_store(&self, store_id: Uuid) -> Result<Store> {
        self.transition_store(Actor::Admin, store_id, Store::suspend).await
    }

    pub async fn unsuspend_store(&self, store_id: Uuid) -> Result<Store> {
        self.transition_store(Actor::Admin, store_id, Store::unsuspend).await
    }

    /// Seller toggle on the caller's own store.
    pub async fn activate_my_store(&self, owner_id: Uuid) -> Result<Store> {
        self.transition_store(Actor::Owner(owner_id), owner_id, Store::activate).await
    }

    pub async fn deactivate_my_store(&self, owner_id: Uuid) -> Result<Store> {
        self.transition_store(Actor::Owner(owner_id), owner_id, Store::deactivate).await
    }

    async fn transition_product(&self, actor: Actor, product_id: Uuid, apply: ProductTransition) -> Result<Product> {
        let mut uow = self.storage.begin().await?;
        let result = async {
            let mut product = uow.lock_product(product_id).await?.ok_or(MarketError::ProductNotFound(product_id))?;
            let store = uow.get_store(product.store_id).await?.ok_or(MarketError::StoreNotFound)?;
            if let Actor::Owner(owner_id) = actor {
                if !store.is_owned_by(owner_id) { return Err(MarketError::ProductAccessDenied); }
            }
            let category = uow.get_category(product.category_id).await?
                .ok_or(MarketError::CategoryNotFound(product.category_id))?;
            apply(&mut product, &store, &category)?;
            uow.save_product_status(&product).await?;
            Ok(product)
        }.await;
        let mut product = finish(uow, result).await?;

        info!(%product_id, status = %product.status, ?actor, "product status changed");
        self.events.publish(product.take_events());
        Ok(product)
    }

    /// `Actor::Owner` resolves the store by owner; `Actor::Admin` by `store_id`.
    async fn transition_store(&self, actor: Actor, store_id: Uuid, apply: StoreTransition) -> Result<Store> {
        let mut uow = self.storage.begin().await?;
        let result: Result<_> = async {
            let store = match actor {
                Actor::Owner(owner_id) => uow.get_store_by_owner(owner_id).await?,
                Actor::Admin => uow.get_store(store_id).await?,
            };
            let mut store = store.ok_or(MarketError::StoreNotFound)?;
            apply(&mut store)?;
            uow.save_store_status(&store).await?;
            Ok(store)
        }.await;
        let mut store = finish(uow, result).await?;

        info!(store_id = %store.id, status = %store.status, ?actor, "store status changed");
        self.events.publish(store.take_events());
        Ok(store)
    }
}

/// Recomputes the category's has-active-product flag from current product
/// state. Safe to run concurrently with itself; returns the new flag.
pub async fn refresh_category_flag<S: Storage>(storage: &S, category_id: Uuid) -> Result<bool> {
    let mut uow = storage.begin().await?;
    let result: Result<_> = async {
        let has_active = uow.category_has_active_product(category_id).await?;
        uow.set_category_flag(category_id, has_active).await?;
        Ok(has_active)
    }.await;
    finish(uow, result).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CategoryStatus, ProductStatus, StoreStatus};
    use crate::domain::events::{DomainEvent, ProductEvent, StoreEvent};
    use crate::services::testkit::Fixture;

    #[tokio::test]
    async fn test_owner_activation() {
        let mut fx = Fixture::new().await;
        let p = fx.product("Lamp", 10, 4, ProductStatus::Inactive).await;

        assert!(matches!(fx.market.activate_product(fx.buyer, p).await, Err(MarketError::ProductAccessDenied)));
        let product = fx.market.activate_product(fx.seller, p).await.unwrap();
        assert_eq!(product.status, ProductStatus::Active);
        assert!(matches!(fx.market.activate_product(fx.seller, p).await, Err(MarketError::AlreadyActive)));
        assert!(matches!(
            fx.drain_events().as_slice(),
            [DomainEvent::Product(ProductEvent::StatusChanged { status: ProductStatus::Active, .. })]
        ));

        fx.market.deactivate_product(fx.seller, p).await.unwrap();
        assert!(matches!(fx.market.deactivate_product(fx.seller, p).await, Err(MarketError::AlreadyInactive)));
        assert_eq!(fx.storage.state().await.products[&p].status, ProductStatus::Inactive);
    }

    #[tokio::test]
    async fn test_activation_checks_store_category_and_stock() {
        let fx = Fixture::new().await;
        let empty = fx.product("Empty", 10, 0, ProductStatus::Inactive).await;
        assert!(matches!(fx.market.activate_product(fx.seller, empty).await, Err(MarketError::OutOfStock)));

        let p = fx.product("Lamp", 10, 4, ProductStatus::Inactive).await;
        {
            let mut state = fx.storage.state().await;
            let mut category = state.categories.remove(&fx.category).unwrap();
            category.status = CategoryStatus::Inactive;
            fx.storage.insert_category(category).await;
        }
        assert!(matches!(fx.market.activate_product(fx.seller, p).await, Err(MarketError::CategoryInactive)));

        fx.market.deactivate_my_store(fx.seller).await.unwrap();
        assert!(matches!(fx.market.activate_product(fx.seller, p).await, Err(MarketError::StoreInactive)));
        assert_eq!(fx.storage.state().await.products[&p].status, ProductStatus::Inactive);
    }

    #[tokio::test]
    async fn test_admin_suspension() {
        let fx = Fixture::new().await;
        let p = fx.active_product("Lamp", 10, 4).await;

        fx.market.suspend_product(p).await.unwrap();
        assert!(matches!(fx.market.suspend_product(p).await, Err(MarketError::AlreadySuspended)));
        assert!(matches!(fx.market.deactivate_product(fx.seller, p).await, Err(MarketError::ProductSuspended)));
        let product = fx.market.unsuspend_product(p).await.unwrap();
        assert_eq!(product.status, ProductStatus::Active);
        assert!(matches!(fx.market.unsuspend_product(p).await, Err(MarketError::NotSuspended)));
    }

    #[tokio::test]
    async fn test_store_lifecycle() {
        let mut fx = Fixture::new().await;

        let store = fx.market.suspend_store(fx.store).await.unwrap();
        assert_eq!(store.status, StoreStatus::Suspended);
        assert!(matches!(fx.market.activate_my_store(fx.seller).await, Err(MarketError::StoreSuspended)));
        let store = fx.market.unsuspend_store(fx.store).await.unwrap();
        assert_eq!(store.status, StoreStatus::Inactive);
        fx.market.activate_my_store(fx.seller).await.unwrap();
        assert!(matches!(fx.market.approve_store(fx.store).await, Err(MarketError::StoreNotPending)));
        assert!(matches!(fx.market.activate_my_store(fx.buyer).await, Err(MarketError::StoreNotFound)));
        assert!(matches!(fx.market.reject_store(Uuid::new_v4()).await, Err(MarketError::StoreNotFound)));

        let events = fx.drain_events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| matches!(e, DomainEvent::Store(StoreEvent::StatusChanged { .. }))));
    }

    #[tokio::test]
    async fn test_refresh_category_flag() {
        let fx = Fixture::new().await;
        let p = fx.active_product("Lamp", 10, 4).await;

        assert!(refresh_category_flag(&fx.storage, fx.category).await.unwrap());
        assert!(fx.storage.state().await.categories[&fx.category].has_active_product);

        fx.market.deactivate_product(fx.seller, p).await.unwrap();
        assert!(!refresh_category_flag(&fx.storage, fx.category).await.unwrap());
        assert!(!fx.storage.state().await.categories[&fx.category].has_active_product);
        assert!(matches!(refresh_category_flag(&fx.storage, Uuid::new_v4()).await, Err(MarketError::CategoryNotFound(_))));
    }
}
