//! Store Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DomainEvent, StoreEvent};
use crate::error::{MarketError, Result};

#[derive(Clone, Debug, Serialize)]
pub struct Store {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: StoreStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus { #[default] Pending, Active, Inactive, Suspended }

text_status!(StoreStatus { Pending => "pending", Active => "active", Inactive => "inactive", Suspended => "suspended" });

impl Store {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.owner_id == user_id }

    /// Admin approval of a new store.
    pub fn approve(&mut self) -> Result<()> {
        if self.status != StoreStatus::Pending { return Err(MarketError::StoreNotPending); }
        self.set_status(StoreStatus::Active);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<()> {
        if self.status != StoreStatus::Pending { return Err(MarketError::StoreNotPending); }
        self.set_status(StoreStatus::Inactive);
        Ok(())
    }

    /// Seller toggle back on.
    pub fn activate(&mut self) -> Result<()> {
        match self.status {
            StoreStatus::Suspended => Err(MarketError::StoreSuspended),
            StoreStatus::Pending => Err(MarketError::StoreNotApproved),
            StoreStatus::Active => Err(MarketError::AlreadyActive),
            StoreStatus::Inactive => { self.set_status(StoreStatus::Active); Ok(()) }
        }
    }

    pub fn deactivate(&mut self) -> Result<()> {
        match self.status {
            StoreStatus::Suspended => Err(MarketError::StoreSuspended),
            StoreStatus::Pending => Err(MarketError::StoreNotApproved),
            StoreStatus::Inactive => Err(MarketError::AlreadyInactive),
            StoreStatus::Active => { self.set_status(StoreStatus::Inactive); Ok(()) }
        }
    }

    pub fn suspend(&mut self) -> Result<()> {
        if self.status == StoreStatus::Suspended { return Err(MarketError::AlreadySuspended); }
        self.set_status(StoreStatus::Suspended);
        Ok(())
    }

    /// Lifting a suspension never restores visibility; the seller re-activates.
    pub fn unsuspend(&mut self) -> Result<()> {
        if self.status != StoreStatus::Suspended { return Err(MarketError::NotSuspended); }
        self.set_status(StoreStatus::Inactive);
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn set_status(&mut self, status: StoreStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        self.events.push(DomainEvent::Store(StoreEvent::StatusChanged { store_id: self.id, status }));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_store(status: StoreStatus) -> Store {
        Store { id: Uuid::new_v4(), owner_id: Uuid::new_v4(), name: "Shop".into(), status, updated_at: Utc::now(), events: vec![] }
    }

    #[test]
    fn test_approval_gate() {
        let mut s = sample_store(StoreStatus::Pending);
        assert!(matches!(s.activate(), Err(MarketError::StoreNotApproved)));
        s.approve().unwrap();
        assert_eq!(s.status, StoreStatus::Active);
        assert!(matches!(s.approve(), Err(MarketError::StoreNotPending)));
        let mut r = sample_store(StoreStatus::Pending);
        r.reject().unwrap();
        assert_eq!(r.status, StoreStatus::Inactive);
    }

    #[test]
    fn test_unsuspend_lands_inactive() {
        let mut s = sample_store(StoreStatus::Active);
        s.suspend().unwrap();
        assert!(matches!(s.activate(), Err(MarketError::StoreSuspended)));
        assert!(matches!(s.deactivate(), Err(MarketError::StoreSuspended)));
        s.unsuspend().unwrap();
        assert_eq!(s.status, StoreStatus::Inactive);
        s.activate().unwrap();
        assert!(matches!(s.activate(), Err(MarketError::AlreadyActive)));
        assert_eq!(s.take_events().len(), 3);
    }
}
