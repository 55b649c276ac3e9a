//! Price snapshot: a product's commercial attributes frozen at order time

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Money,
    pub discount_price: Option<Money>,
    pub store_id: Uuid,
    pub category_id: Uuid,
    pub captured_at: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn capture(product: &Product, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), product_id: product.id, name: product.name.clone(), slug: product.slug.clone(),
            description: product.description.clone(), price: product.price, discount_price: product.discount_price,
            store_id: product.store_id, category_id: product.category_id, captured_at: at,
        }
    }

    pub fn unit_price(&self) -> Money { effective_price(self.price, self.discount_price) }
}

/// The discounted tier applies only when it is positive and below the list price.
pub(crate) fn effective_price(price: Money, discount_price: Option<Money>) -> Money {
    match discount_price {
        Some(d) if d.is_positive() && d < price => d,
        _ => price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::sample_product;

    #[test]
    fn test_snapshot_is_detached_from_live_product() {
        let mut product = sample_product(5);
        let snapshot = PriceSnapshot::capture(&product, Utc::now());
        product.price = Money::from_major(1);
        product.name = "Renamed".into();
        assert_eq!(snapshot.price, Money::from_major(100));
        assert_eq!(snapshot.name, "Widget");
        assert_eq!(snapshot.store_id, product.store_id);
    }

    #[test]
    fn test_discount_tier() {
        assert_eq!(effective_price(Money::from_major(100), Some(Money::from_major(80))), Money::from_major(80));
        assert_eq!(effective_price(Money::from_major(100), Some(Money::from_major(120))), Money::from_major(100));
        assert_eq!(effective_price(Money::from_major(100), Some(Money::ZERO)), Money::from_major(100));
        assert_eq!(effective_price(Money::from_major(100), None), Money::from_major(100));
    }
}
