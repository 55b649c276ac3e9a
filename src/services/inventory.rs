//! Inventory Ledger.
//!
//! Stock is reserved (decremented) when an order is assembled, committed
//! (sold count incremented) when its payment succeeds, and released back to
//! stock when the order fails or is cancelled.

use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;
use crate::domain::aggregates::{LineItem, Product, StoreStatus};
use crate::error::{MarketError, Result};
use crate::repository::Catalog;
use super::OrderLine;

/// Locks every product named by `lines`, verifies it is orderable and that
/// stock covers the combined requested quantity, then reserves that stock.
///
/// Rows are locked in ascending id order so concurrent reservations over
/// overlapping products cannot deadlock. Returns the products as read before
/// the reservation, keyed by id.
pub async fn reserve<U: Catalog>(uow: &mut U, lines: &[OrderLine]) -> Result<BTreeMap<Uuid, Product>> {
    let mut wanted: BTreeMap<Uuid, u32> = BTreeMap::new();
    for line in lines {
        let total = wanted.entry(line.product_id).or_insert(0);
        *total = total.checked_add(line.quantity.value())
            .ok_or_else(|| MarketError::Validation(format!("quantity overflow for product {}", line.product_id)))?;
    }

    let mut locked = BTreeMap::new();
    for (&product_id, &requested) in &wanted {
        let product = uow.lock_product(product_id).await?.ok_or(MarketError::ProductNotFound(product_id))?;
        ensure_orderable(uow, &product).await?;
        if product.stock < i64::from(requested) {
            return Err(MarketError::InsufficientStock { product_id, requested, available: product.stock });
        }
        locked.insert(product_id, product);
    }

    for (&product_id, &qty) in &wanted {
        uow.decrement_stock(product_id, qty).await?;
        debug!(%product_id, qty, "stock reserved");
    }
    Ok(locked)
}

/// Makes the reservation behind `items` permanent.
pub async fn commit<U: Catalog>(uow: &mut U, items: &[LineItem]) -> Result<()> {
    for (product_id, qty) in per_product(items) {
        uow.increment_sold_count(product_id, qty).await?;
        debug!(%product_id, qty, "stock consumed");
    }
    Ok(())
}

/// Returns the reservation behind `items` to stock.
pub async fn release<U: Catalog>(uow: &mut U, items: &[LineItem]) -> Result<()> {
    for (product_id, qty) in per_product(items) {
        uow.restore_stock(product_id, qty).await?;
        debug!(%product_id, qty, "stock released");
    }
    Ok(())
}

async fn ensure_orderable<U: Catalog>(uow: &mut U, product: &Product) -> Result<()> {
    if !product.is_active() { return Err(MarketError::ProductUnavailable(product.id)); }
    let store = uow.get_store(product.store_id).await?.ok_or(MarketError::StoreNotFound)?;
    if store.status != StoreStatus::Active { return Err(MarketError::ProductUnavailable(product.id)); }
    Ok(())
}

fn per_product(items: &[LineItem]) -> BTreeMap<Uuid, u32> {
    let mut totals = BTreeMap::new();
    for item in items {
        *totals.entry(item.product_id).or_insert(0u32) += item.quantity.value();
    }
    totals
}
