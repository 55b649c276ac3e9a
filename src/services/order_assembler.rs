//! Order Assembler: cart → reserved stock, frozen prices, persisted order

use tracing::{info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{LineItem, Order, PriceSnapshot};
use crate::domain::value_objects::{InvoiceCode, Quantity};
use crate::error::{MarketError, Result};
use crate::repository::{Directory, OrderLedger, Storage};
use super::{finish, inventory, Marketplace};

const INVOICE_ATTEMPTS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: Quantity,
}

impl<S: Storage> Marketplace<S> {
    /// Creates a pending order as one unit of work. Any failure leaves no
    /// order, line item, snapshot or stock change behind.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create_order(
        &self, buyer_id: Uuid, shipping_address_id: Uuid, payment_method: &str, lines: &[OrderLine],
    ) -> Result<Order> {
        if lines.is_empty() { return Err(MarketError::Validation("order must contain at least one line".into())); }
        if payment_method.trim().is_empty() { return Err(MarketError::Validation("payment method is required".into())); }

        let mut uow = self.storage.begin().await?;
        let result = self.assemble(&mut uow, buyer_id, shipping_address_id, payment_method, lines).await;
        let mut order = finish(uow, result).await?;

        info!(order_id = %order.id, invoice = %order.invoice_code, total = %order.total, "order placed");
        self.events.publish(order.take_events());
        Ok(order)
    }

    /// Returns the buyer's order with its line items.
    pub async fn get_order(&self, buyer_id: Uuid, order_id: Uuid) -> Result<Order> {
        let mut uow = self.storage.begin().await?;
        let result = async {
            let order = uow.get_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
            if order.buyer_id != buyer_id { return Err(MarketError::OrderAccessDenied); }
            Ok(order)
        }.await;
        finish(uow, result).await
    }

    async fn assemble(
        &self, uow: &mut S::Uow, buyer_id: Uuid, shipping_address_id: Uuid, payment_method: &str, lines: &[OrderLine],
    ) -> Result<Order> {
        uow.get_user(buyer_id).await?.ok_or(MarketError::UserNotFound(buyer_id))?;
        if !uow.address_owned_by(shipping_address_id, buyer_id).await? {
            return Err(MarketError::AddressAccessDenied);
        }

        let now = self.clock.now();
        let products = inventory::reserve(uow, lines).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = products.get(&line.product_id).ok_or(MarketError::ProductNotFound(line.product_id))?;
            let snapshot = PriceSnapshot::capture(product, now);
            uow.insert_snapshot(&snapshot).await?;
            items.push(LineItem::from_snapshot(&snapshot, line.quantity));
        }

        let invoice = self.unique_invoice(uow, buyer_id).await?;
        let order = Order::place(buyer_id, shipping_address_id, payment_method, invoice, items, now)?;
        uow.insert_order(&order).await?;
        for item in &order.items {
            uow.insert_line_item(item).await?;
        }
        Ok(order)
    }

    async fn unique_invoice(&self, uow: &mut S::Uow, buyer_id: Uuid) -> Result<InvoiceCode> {
        for _ in 0..INVOICE_ATTEMPTS {
            let code = InvoiceCode::generate(buyer_id, self.clock.now());
            if !uow.invoice_exists(&code).await? { return Ok(code); }
        }
        Err(MarketError::Storage("could not allocate a unique invoice code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;
    use crate::domain::events::{DomainEvent, OrderEvent};
    use crate::domain::value_objects::Money;
    use crate::services::testkit::Fixture;
    use std::collections::HashSet;

    fn line(product_id: Uuid, qty: u32) -> OrderLine { OrderLine { product_id, quantity: Quantity::new(qty).unwrap() } }

    #[tokio::test]
    async fn test_two_line_order_totals_and_snapshots() {
        let mut fx = Fixture::new().await;
        let a = fx.active_product("Phone", 17_000_000, 5).await;
        let b = fx.active_product("Case", 500_000, 10).await;

        let order = fx.market.create_order(fx.buyer, fx.address, "bank_transfer", &[line(a, 1), line(b, 2)]).await.unwrap();
        assert_eq!(order.total, Money::from_major(18_000_000));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.invoice_code.as_str().is_empty());
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[1].subtotal, Money::from_major(1_000_000));

        let state = fx.storage.state().await;
        assert_eq!(state.orders[&order.id].items.len(), 2);
        assert_eq!(state.snapshots.len(), 2);
        assert_eq!(state.products[&a].stock, 4);
        assert_eq!(state.products[&b].stock, 8);
        assert!(matches!(fx.drain_events().as_slice(), [DomainEvent::Order(OrderEvent::Placed { .. })]));
    }

    #[tokio::test]
    async fn test_snapshot_survives_product_edit() {
        let fx = Fixture::new().await;
        let a = fx.active_product("Phone", 17_000_000, 5).await;
        let order = fx.market.create_order(fx.buyer, fx.address, "bank_transfer", &[line(a, 1)]).await.unwrap();

        fx.storage.update_product(a, |p| { p.price = Money::from_major(1); p.name = "Phone v2".into(); }).await;

        let state = fx.storage.state().await;
        let item = &state.orders[&order.id].items[0];
        let snapshot = &state.snapshots[&item.snapshot_id];
        assert_eq!(snapshot.price, Money::from_major(17_000_000));
        assert_eq!(snapshot.name, "Phone");
        assert_eq!(item.product_name, "Phone");
        assert_eq!(item.unit_price, Money::from_major(17_000_000));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_everything() {
        let mut fx = Fixture::new().await;
        let a = fx.active_product("Phone", 17_000_000, 5).await;
        let b = fx.active_product("Case", 500_000, 1).await;

        let err = fx.market.create_order(fx.buyer, fx.address, "bank_transfer", &[line(a, 1), line(b, 2)]).await.unwrap_err();
        assert!(matches!(err, MarketError::InsufficientStock { product_id, requested: 2, available: 1 } if product_id == b));

        let state = fx.storage.state().await;
        assert!(state.orders.is_empty());
        assert!(state.snapshots.is_empty());
        assert_eq!(state.products[&a].stock, 5);
        assert_eq!(state.products[&b].stock, 1);
        assert!(fx.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_preconditions() {
        let fx = Fixture::new().await;
        let a = fx.active_product("Phone", 100, 5).await;

        let stranger = Uuid::new_v4();
        let err = fx.market.create_order(stranger, fx.address, "bank_transfer", &[line(a, 1)]).await.unwrap_err();
        assert!(matches!(err, MarketError::UserNotFound(id) if id == stranger));

        let err = fx.market.create_order(fx.seller, fx.address, "bank_transfer", &[line(a, 1)]).await.unwrap_err();
        assert!(matches!(err, MarketError::AddressAccessDenied));

        let err = fx.market.create_order(fx.buyer, fx.address, "bank_transfer", &[]).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
        assert!(fx.storage.state().await.orders.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_orders_never_oversell() {
        let fx = Fixture::new().await;
        let a = fx.active_product("Last one", 100, 3).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let market = fx.market.clone();
            let (buyer, address) = (fx.buyer, fx.address);
            tasks.push(tokio::spawn(async move {
                market.create_order(buyer, address, "bank_transfer", &[line(a, 1)]).await
            }));
        }
        let mut placed = 0;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => placed += 1,
                Err(e) => assert!(matches!(e, MarketError::InsufficientStock { .. })),
            }
        }
        assert_eq!(placed, 3);
        let state = fx.storage.state().await;
        assert_eq!(state.products[&a].stock, 0);
        let invoices: HashSet<_> = state.orders.values().map(|o| o.invoice_code.clone()).collect();
        assert_eq!(invoices.len(), 3);
    }

    #[tokio::test]
    async fn test_get_order_is_buyer_only() {
        let fx = Fixture::new().await;
        let a = fx.active_product("Phone", 100, 5).await;
        let order = fx.market.create_order(fx.buyer, fx.address, "bank_transfer", &[line(a, 2)]).await.unwrap();
        let fetched = fx.market.get_order(fx.buyer, order.id).await.unwrap();
        assert_eq!(fetched.items, order.items);
        assert!(matches!(fx.market.get_order(fx.seller, order.id).await, Err(MarketError::OrderAccessDenied)));
    }
}
