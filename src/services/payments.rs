//! Payment Intent State Machine.
//!
//! Every operation locks the order before the intent, so a callback and a
//! cancellation racing on the same order serialise instead of deadlocking.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{Order, PaymentIntent, Transition};
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::error::{MarketError, Result};
use crate::repository::{OrderLedger, PaymentLedger, Storage};
use super::{finish, inventory, Marketplace};

impl<S: Storage> Marketplace<S> {
    /// Returns the order's live pending intent, or opens a new one. An overdue
    /// pending intent is expired first.
    #[instrument(skip(self))]
    pub async fn create_intent(&self, requester_id: Uuid, order_id: Uuid, method: &str) -> Result<PaymentIntent> {
        if method.trim().is_empty() { return Err(MarketError::Validation("payment method is required".into())); }
        let now = self.clock.now();
        let ttl = self.settings.intent_ttl;

        let mut uow = self.storage.begin().await?;
        let result = async {
            let order = uow.lock_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
            if order.buyer_id != requester_id { return Err(MarketError::OrderAccessDenied); }
            if !order.is_pending() { return Err(MarketError::OrderNotPending); }

            let mut events = vec![];
            if let Some(existing) = uow.pending_intent_for_order(order_id).await? {
                if !existing.is_overdue(now) { return Ok((existing, events)); }
                let count = uow.expire_pending_intents(order_id, now).await?;
                events.push(DomainEvent::Payment(PaymentEvent::IntentExpired { order_id, count }));
            }

            let intent = PaymentIntent::open(order_id, method, now, ttl);
            uow.insert_intent(&intent).await?;
            events.push(DomainEvent::Payment(PaymentEvent::IntentCreated { intent_id: intent.id, order_id }));
            Ok((intent, events))
        }.await;
        let (intent, events) = finish(uow, result).await?;

        if events.is_empty() {
            debug!(intent_id = %intent.id, "returning live pending intent");
        } else {
            info!(intent_id = %intent.id, expires_at = %intent.expires_at, "payment intent opened");
        }
        self.events.publish(events);
        Ok(intent)
    }

    /// Success callback. Re-delivery after the order is paid is acknowledged
    /// without side effects.
    #[instrument(skip(self, gateway_ref))]
    pub async fn process_success(
        &self, intent_id: Uuid, gateway_ref: Option<String>, paid_at: Option<DateTime<Utc>>,
    ) -> Result<PaymentIntent> {
        let now = self.clock.now();
        let mut uow = self.storage.begin().await?;
        let result: Result<_> = async {
            let (mut order, mut intent) = self.lock_pair(&mut uow, intent_id).await?;
            match intent.success_transition(order.status)? {
                Transition::Noop => return Ok((intent, order, false)),
                Transition::Apply => {}
            }
            intent.succeed(gateway_ref, now)?;
            order.mark_paid(paid_at.unwrap_or(now))?;
            uow.save_intent(&intent).await?;
            uow.save_order_status(&order).await?;
            inventory::commit(&mut uow, &order.items).await?;
            Ok((intent, order, true))
        }.await;
        let (intent, mut order, applied) = finish(uow, result).await?;

        if applied {
            info!(order_id = %order.id, "order paid");
            self.events.publish(order.take_events());
        } else {
            debug!("duplicate success callback acknowledged");
        }
        Ok(intent)
    }

    /// Failure callback. Already settled intents are left untouched. The order
    /// fails and releases its stock only while still pending.
    #[instrument(skip(self, gateway_ref))]
    pub async fn process_failed(&self, intent_id: Uuid, gateway_ref: Option<String>) -> Result<PaymentIntent> {
        let now = self.clock.now();
        let mut uow = self.storage.begin().await?;
        let result: Result<_> = async {
            let (mut order, mut intent) = self.lock_pair(&mut uow, intent_id).await?;
            if intent.failure_transition() == Transition::Noop { return Ok((intent, order)); }
            intent.fail(gateway_ref, now)?;
            uow.save_intent(&intent).await?;
            if order.is_pending() {
                order.mark_failed()?;
                uow.save_order_status(&order).await?;
                inventory::release(&mut uow, &order.items).await?;
            }
            Ok((intent, order))
        }.await;
        let (intent, mut order) = finish(uow, result).await?;

        let events = order.take_events();
        if events.is_empty() {
            debug!(order_status = %order.status, "failure callback changed no order");
        } else {
            warn!(order_id = %order.id, "payment failed");
        }
        self.events.publish(events);
        Ok(intent)
    }

    /// Expires every pending intent of the order; returns how many moved.
    #[instrument(skip(self))]
    pub async fn expire_by_order(&self, order_id: Uuid) -> Result<u64> {
        let now = self.clock.now();
        let mut uow = self.storage.begin().await?;
        let result = async {
            uow.lock_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
            uow.expire_pending_intents(order_id, now).await
        }.await;
        let count = finish(uow, result).await?;

        if count > 0 {
            info!(count, "payment intents expired");
            self.events.publish([DomainEvent::Payment(PaymentEvent::IntentExpired { order_id, count })]);
        }
        Ok(count)
    }

    /// Buyer cancellation of a pending order.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, buyer_id: Uuid, order_id: Uuid) -> Result<Order> {
        let mut uow = self.storage.begin().await?;
        let result = async {
            let order = uow.lock_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
            if order.buyer_id != buyer_id { return Err(MarketError::OrderAccessDenied); }
            self.cancel_locked(&mut uow, order).await
        }.await;
        let mut order = finish(uow, result).await?;

        info!(%order_id, "order cancelled");
        self.events.publish(order.take_events());
        Ok(order)
    }

    /// Expires overdue pending intents across all orders. Overdue-ness is
    /// rechecked under each order's lock, so an intent opened after the scan
    /// survives. Per-order failures are logged and skipped.
    pub async fn expire_overdue_intents(&self) -> Result<u64> {
        let mut uow = self.storage.begin().await?;
        let scan = uow.orders_with_overdue_intents(self.clock.now()).await;
        let order_ids = finish(uow, scan).await?;

        let mut expired = 0;
        for order_id in order_ids {
            let now = self.clock.now();
            let mut uow = self.storage.begin().await?;
            let result = async {
                uow.lock_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
                uow.expire_overdue_intents(order_id, now).await
            }.await;
            match finish(uow, result).await {
                Ok(0) => debug!(%order_id, "no overdue intent left to expire"),
                Ok(count) => {
                    expired += count;
                    info!(%order_id, count, "overdue payment intents expired");
                    self.events.publish([DomainEvent::Payment(PaymentEvent::IntentExpired { order_id, count })]);
                }
                Err(e) => warn!(%order_id, error = %e, "intent expiry failed"),
            }
        }
        Ok(expired)
    }

    /// Cancels pending orders that have held their reservation longer than
    /// the reservation TTL. Each order is rechecked under its own lock.
    pub async fn cancel_stale_orders(&self) -> Result<u64> {
        let cutoff = self.clock.now() - self.settings.reservation_ttl;
        let mut uow = self.storage.begin().await?;
        let scan = uow.stale_pending_orders(cutoff).await;
        let order_ids = finish(uow, scan).await?;

        let mut cancelled = 0;
        for order_id in order_ids {
            let mut uow = self.storage.begin().await?;
            let result = async {
                let order = uow.lock_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
                if !order.is_pending() || order.created_at >= cutoff { return Ok(None); }
                self.cancel_locked(&mut uow, order).await.map(Some)
            }.await;
            match finish(uow, result).await {
                Ok(Some(mut order)) => {
                    cancelled += 1;
                    info!(%order_id, "stale order cancelled");
                    self.events.publish(order.take_events());
                }
                Ok(None) => {}
                Err(e) => warn!(%order_id, error = %e, "stale order cancellation failed"),
            }
        }
        Ok(cancelled)
    }

    async fn cancel_locked(&self, uow: &mut S::Uow, mut order: Order) -> Result<Order> {
        order.cancel()?;
        uow.save_order_status(&order).await?;
        let count = uow.expire_pending_intents(order.id, self.clock.now()).await?;
        if count > 0 { debug!(order_id = %order.id, count, "pending intents expired by cancellation"); }
        inventory::release(uow, &order.items).await?;
        Ok(order)
    }

    /// Resolves the intent's order, then locks order and intent in that order
    /// and re-reads the intent under its lock.
    async fn lock_pair(&self, uow: &mut S::Uow, intent_id: Uuid) -> Result<(Order, PaymentIntent)> {
        let order_id = uow.get_intent(intent_id).await?.ok_or(MarketError::IntentNotFound(intent_id))?.order_id;
        let order = uow.lock_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
        let intent = uow.lock_intent(intent_id).await?.ok_or(MarketError::IntentNotFound(intent_id))?;
        Ok((order, intent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::clock::Clock;
    use crate::domain::aggregates::{IntentStatus, OrderStatus};
    use crate::domain::events::OrderEvent;
    use crate::domain::value_objects::Quantity;
    use crate::services::testkit::Fixture;
    use crate::services::OrderLine;

    async fn placed(fx: &mut Fixture, stock: i64, qty: u32) -> (Uuid, Order) {
        let product = fx.active_product("Phone", 1_000, stock).await;
        let line = OrderLine { product_id: product, quantity: Quantity::new(qty).unwrap() };
        let order = fx.market.create_order(fx.buyer, fx.address, "bank_transfer", &[line]).await.unwrap();
        fx.drain_events();
        (product, order)
    }

    #[tokio::test]
    async fn test_create_intent_is_idempotent_while_live() {
        let mut fx = Fixture::new().await;
        let (_, order) = placed(&mut fx, 5, 1).await;

        let first = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();
        assert_eq!(first.status, IntentStatus::Pending);
        assert_eq!(first.expires_at, fx.clock.now() + Duration::minutes(30));
        let again = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(fx.storage.state().await.intents.len(), 1);
        assert_eq!(fx.drain_events().len(), 1);

        assert!(matches!(fx.market.create_intent(fx.seller, order.id, "bank_transfer").await, Err(MarketError::OrderAccessDenied)));
    }

    #[tokio::test]
    async fn test_overdue_intent_is_replaced() {
        let mut fx = Fixture::new().await;
        let (_, order) = placed(&mut fx, 5, 1).await;
        let first = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();

        fx.clock.advance(Duration::minutes(31));
        let second = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();
        assert_ne!(second.id, first.id);
        let state = fx.storage.state().await;
        assert_eq!(state.intents[&first.id].status, IntentStatus::Expired);
        assert_eq!(state.intents[&second.id].status, IntentStatus::Pending);
    }

    #[tokio::test]
    async fn test_success_pays_order_once() {
        let mut fx = Fixture::new().await;
        let (product, order) = placed(&mut fx, 5, 2).await;
        let intent = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();
        fx.drain_events();

        let settled = fx.market.process_success(intent.id, Some("gw-1".into()), None).await.unwrap();
        assert_eq!(settled.status, IntentStatus::Success);
        assert_eq!(settled.gateway_ref.as_deref(), Some("gw-1"));
        let again = fx.market.process_success(intent.id, Some("gw-1".into()), None).await.unwrap();
        assert_eq!(again.status, IntentStatus::Success);

        let state = fx.storage.state().await;
        let stored = &state.orders[&order.id];
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(stored.paid_at, Some(fx.clock.now()));
        assert_eq!(state.products[&product].stock, 3);
        assert_eq!(state.products[&product].sold_count, 2);
        assert!(matches!(fx.drain_events().as_slice(), [DomainEvent::Order(OrderEvent::Paid { .. })]));

        assert!(matches!(fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await, Err(MarketError::OrderNotPending)));
    }

    #[tokio::test]
    async fn test_failed_or_expired_intent_cannot_succeed() {
        let mut fx = Fixture::new().await;
        let (product, order) = placed(&mut fx, 5, 1).await;
        let intent = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();

        fx.market.process_failed(intent.id, None).await.unwrap();
        fx.market.process_failed(intent.id, None).await.unwrap();
        assert!(matches!(fx.market.process_success(intent.id, None, None).await, Err(MarketError::InvalidIntentState)));

        let state = fx.storage.state().await;
        assert_eq!(state.orders[&order.id].status, OrderStatus::Failed);
        assert_eq!(state.intents[&intent.id].status, IntentStatus::Failed);
        assert_eq!(state.products[&product].stock, 5);
        assert_eq!(state.products[&product].sold_count, 0);

        let mut fx = Fixture::new().await;
        let (_, order) = placed(&mut fx, 5, 1).await;
        let intent = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();
        assert_eq!(fx.market.expire_by_order(order.id).await.unwrap(), 1);
        assert_eq!(fx.market.expire_by_order(order.id).await.unwrap(), 0);
        assert!(matches!(fx.market.process_success(intent.id, None, None).await, Err(MarketError::InvalidIntentState)));
        assert_eq!(fx.storage.state().await.orders[&order.id].status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let fx = Fixture::new().await;
        let missing = Uuid::new_v4();
        assert!(matches!(fx.market.process_success(missing, None, None).await, Err(MarketError::IntentNotFound(id)) if id == missing));
        assert!(matches!(fx.market.process_failed(missing, None).await, Err(MarketError::IntentNotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_releases_stock_and_expires_intent() {
        let mut fx = Fixture::new().await;
        let (product, order) = placed(&mut fx, 5, 3).await;
        let intent = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();

        assert!(matches!(fx.market.cancel_order(fx.seller, order.id).await, Err(MarketError::OrderAccessDenied)));
        let cancelled = fx.market.cancel_order(fx.buyer, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(matches!(fx.market.cancel_order(fx.buyer, order.id).await, Err(MarketError::OrderNotPending)));

        // A late failure callback only settles the intent.
        fx.market.process_failed(intent.id, None).await.unwrap();
        let state = fx.storage.state().await;
        assert_eq!(state.products[&product].stock, 5);
        assert_eq!(state.intents[&intent.id].status, IntentStatus::Expired);
        assert_eq!(state.orders[&order.id].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_sweeps() {
        let mut fx = Fixture::new().await;
        let (product, order) = placed(&mut fx, 5, 2).await;
        let intent = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();

        assert_eq!(fx.market.expire_overdue_intents().await.unwrap(), 0);
        fx.clock.advance(Duration::minutes(45));
        assert_eq!(fx.market.expire_overdue_intents().await.unwrap(), 1);
        assert_eq!(fx.storage.state().await.intents[&intent.id].status, IntentStatus::Expired);

        assert_eq!(fx.market.expire_overdue_intents().await.unwrap(), 0);
        assert_eq!(fx.market.cancel_stale_orders().await.unwrap(), 0);
        fx.clock.advance(Duration::hours(24));
        assert_eq!(fx.market.cancel_stale_orders().await.unwrap(), 1);
        let state = fx.storage.state().await;
        assert_eq!(state.orders[&order.id].status, OrderStatus::Cancelled);
        assert_eq!(state.products[&product].stock, 5);
    }

    #[tokio::test]
    async fn test_sweep_expires_only_overdue_intents() {
        let mut fx = Fixture::new().await;
        let (_, early) = placed(&mut fx, 5, 1).await;
        let old = fx.market.create_intent(fx.buyer, early.id, "bank_transfer").await.unwrap();
        fx.clock.advance(Duration::minutes(20));
        let (_, late) = placed(&mut fx, 5, 1).await;
        let young = fx.market.create_intent(fx.buyer, late.id, "bank_transfer").await.unwrap();
        fx.clock.advance(Duration::minutes(15));
        fx.drain_events();

        assert_eq!(fx.market.expire_overdue_intents().await.unwrap(), 1);
        let state = fx.storage.state().await;
        assert_eq!(state.intents[&old.id].status, IntentStatus::Expired);
        assert_eq!(state.intents[&young.id].status, IntentStatus::Pending);
        assert!(matches!(
            fx.drain_events().as_slice(),
            [DomainEvent::Payment(PaymentEvent::IntentExpired { order_id, count: 1 })] if *order_id == early.id
        ));
    }

    #[tokio::test]
    async fn test_sweep_spares_intent_opened_after_its_scan() {
        let mut fx = Fixture::new().await;
        let (_, order) = placed(&mut fx, 5, 1).await;
        let stale = fx.market.create_intent(fx.buyer, order.id, "bank_transfer").await.unwrap();
        fx.clock.advance(Duration::minutes(31));

        // Queue the sweep ahead of the buyer's retry while a unit of work is held.
        let gate = fx.storage.begin().await.unwrap();
        let market = fx.market.clone();
        let sweep = tokio::spawn(async move { market.expire_overdue_intents().await });
        tokio::task::yield_now().await;
        let (market, buyer, order_id) = (fx.market.clone(), fx.buyer, order.id);
        let retry = tokio::spawn(async move { market.create_intent(buyer, order_id, "bank_transfer").await });
        tokio::task::yield_now().await;
        drop(gate);

        let fresh = retry.await.unwrap().unwrap();
        assert_eq!(sweep.await.unwrap().unwrap(), 0);
        assert_ne!(fresh.id, stale.id);
        let state = fx.storage.state().await;
        assert_eq!(state.intents[&stale.id].status, IntentStatus::Expired);
        assert_eq!(state.intents[&fresh.id].status, IntentStatus::Pending);

        let settled = fx.market.process_success(fresh.id, Some("gw-7".into()), None).await.unwrap();
        assert_eq!(settled.status, IntentStatus::Success);
        assert_eq!(fx.storage.state().await.orders[&order.id].status, OrderStatus::Paid);
    }
}
