//! Periodic sweeps over the fulfillment core.

use async_trait::async_trait;
use crate::error::Result;
use crate::repository::Storage;
use crate::services::Marketplace;
use super::Job;

/// Expires pending payment intents whose window has closed.
pub struct IntentExpirySweep<S: Storage> { market: Marketplace<S> }

impl<S: Storage> IntentExpirySweep<S> {
    pub fn new(market: Marketplace<S>) -> Self { Self { market } }
}

#[async_trait]
impl<S: Storage> Job for IntentExpirySweep<S> {
    fn name(&self) -> &'static str { "intent_expiry_sweep" }
    async fn run(&self) -> Result<u64> { self.market.expire_overdue_intents().await }
}

/// Cancels pending orders holding stock past the reservation window.
pub struct StaleOrderSweep<S: Storage> { market: Marketplace<S> }

impl<S: Storage> StaleOrderSweep<S> {
    pub fn new(market: Marketplace<S>) -> Self { Self { market } }
}

#[async_trait]
impl<S: Storage> Job for StaleOrderSweep<S> {
    fn name(&self) -> &'static str { "stale_order_sweep" }
    async fn run(&self) -> Result<u64> { self.market.cancel_stale_orders().await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::domain::aggregates::{IntentStatus, OrderStatus};
    use crate::domain::value_objects::Quantity;
    use crate::scheduler::Scheduler;
    use crate::services::testkit::Fixture;
    use crate::services::OrderLine;

    #[tokio::test]
    async fn test_sweeps_through_scheduler() {
        let fx = Fixture::new().await;
        let product = fx.active_product("Phone", 1_000, 2).await;
        let line = OrderLine { product_id: product, quantity: Quantity::new(2).unwrap() };
        let order = fx.market.create_order(fx.buyer, fx.address, "bank_transfer", &[line]).await.unwrap();
        let intent = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();

        let mut scheduler = Scheduler::new(fx.clock.clone())
            .every(Duration::minutes(1), IntentExpirySweep::new(fx.market.clone()))
            .every(Duration::minutes(1), StaleOrderSweep::new(fx.market.clone()));

        assert_eq!(scheduler.run_due().await, 2);
        assert_eq!(fx.storage.state().await.intents[&intent.id].status, IntentStatus::Pending);

        fx.clock.advance(Duration::hours(25));
        assert_eq!(scheduler.run_due().await, 2);
        let state = fx.storage.state().await;
        assert_eq!(state.intents[&intent.id].status, IntentStatus::Expired);
        assert_eq!(state.orders[&order.id].status, OrderStatus::Cancelled);
        assert_eq!(state.products[&product].stock, 2);
    }
}
