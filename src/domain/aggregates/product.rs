//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::price_snapshot::effective_price;
use crate::domain::aggregates::{Category, Store, StoreStatus};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::Money;
use crate::error::{MarketError, Result};

#[derive(Clone, Debug, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub store_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Money,
    pub discount_price: Option<Money>,
    pub stock: i64,
    pub sold_count: i64,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Inactive, Active, Suspended }

text_status!(ProductStatus { Inactive => "inactive", Active => "active", Suspended => "suspended" });

impl Product {
    pub fn unit_price(&self) -> Money { effective_price(self.price, self.discount_price) }
    pub fn is_active(&self) -> bool { self.status == ProductStatus::Active }

    /// Seller activation. Checks run in a fixed order so the first failing
    /// precondition is the one reported.
    pub fn activate(&mut self, store: &Store, category: &Category) -> Result<()> {
        match self.status {
            ProductStatus::Suspended => return Err(MarketError::ProductSuspended),
            ProductStatus::Active => return Err(MarketError::AlreadyActive),
            ProductStatus::Inactive => {}
        }
        if store.status != StoreStatus::Active { return Err(MarketError::StoreInactive); }
        if !category.is_active() { return Err(MarketError::CategoryInactive); }
        if !category.is_leaf { return Err(MarketError::CategoryNotLeaf); }
        if self.stock <= 0 { return Err(MarketError::OutOfStock); }
        self.set_status(ProductStatus::Active);
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<()> {
        match self.status {
            ProductStatus::Suspended => Err(MarketError::ProductSuspended),
            ProductStatus::Inactive => Err(MarketError::AlreadyInactive),
            ProductStatus::Active => { self.set_status(ProductStatus::Inactive); Ok(()) }
        }
    }

    pub fn suspend(&mut self) -> Result<()> {
        if self.status == ProductStatus::Suspended { return Err(MarketError::AlreadySuspended); }
        self.set_status(ProductStatus::Suspended);
        Ok(())
    }

    pub fn unsuspend(&mut self) -> Result<()> {
        if self.status != ProductStatus::Suspended { return Err(MarketError::NotSuspended); }
        self.set_status(ProductStatus::Active);
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn set_status(&mut self, status: ProductStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        self.events.push(DomainEvent::Product(ProductEvent::StatusChanged {
            product_id: self.id, category_id: self.category_id, status,
        }));
    }
}
