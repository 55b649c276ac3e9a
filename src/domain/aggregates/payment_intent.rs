//! Payment Intent: one attempt to pay an order

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::OrderStatus;
use crate::error::{MarketError, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: String,
    pub status: IntentStatus,
    pub gateway_ref: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus { #[default] Pending, Success, Failed, Expired }

text_status!(IntentStatus { Pending => "pending", Success => "success", Failed => "failed", Expired => "expired" });

/// Outcome of evaluating a callback against the latest persisted state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Apply the transition and its side effects.
    Apply,
    /// Already applied; acknowledge without side effects.
    Noop,
}

impl PaymentIntent {
    pub fn open(order_id: Uuid, method: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, method: method.into(), status: IntentStatus::Pending, gateway_ref: None,
            expires_at: now + ttl, created_at: now, updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool { self.status == IntentStatus::Pending }
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool { self.is_pending() && self.expires_at <= now }

    /// Decision table for a success callback.
    pub fn success_transition(&self, order: OrderStatus) -> Result<Transition> {
        match (self.status, order) {
            (IntentStatus::Success, OrderStatus::Paid) => Ok(Transition::Noop),
            (IntentStatus::Pending, OrderStatus::Pending) => Ok(Transition::Apply),
            _ => Err(MarketError::InvalidIntentState),
        }
    }

    /// Failure callbacks on a settled intent are acknowledged as no-ops.
    pub fn failure_transition(&self) -> Transition {
        if self.is_pending() { Transition::Apply } else { Transition::Noop }
    }

    pub fn succeed(&mut self, gateway_ref: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.settle(IntentStatus::Success, now)?;
        if gateway_ref.is_some() { self.gateway_ref = gateway_ref; }
        Ok(())
    }

    pub fn fail(&mut self, gateway_ref: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.settle(IntentStatus::Failed, now)?;
        if gateway_ref.is_some() { self.gateway_ref = gateway_ref; }
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> { self.settle(IntentStatus::Expired, now) }

    fn settle(&mut self, status: IntentStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.is_pending() { return Err(MarketError::InvalidIntentState); }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}
