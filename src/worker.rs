//! Best-effort side effects. Services hand committed domain events to an
//! [`EventSink`]; the [`EventWorker`] drains them out-of-band.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::repository::Storage;
use crate::services::listing::refresh_category_flag;

const SUBJECT_PREFIX: &str = "marketplace";

#[derive(Clone, Debug)]
pub struct EventSink { tx: mpsc::Sender<DomainEvent> }

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Never blocks; a full or closed queue drops the event.
    pub fn publish(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => warn!(subject = event.subject(), "event queue full, dropping event"),
                Err(TrySendError::Closed(event)) => debug!(subject = event.subject(), "event queue closed, dropping event"),
            }
        }
    }
}

pub struct EventWorker<S: Storage> {
    storage: S,
    rx: mpsc::Receiver<DomainEvent>,
    nats: Option<async_nats::Client>,
}

impl<S: Storage> EventWorker<S> {
    pub fn new(storage: S, rx: mpsc::Receiver<DomainEvent>, nats: Option<async_nats::Client>) -> Self {
        Self { storage, rx, nats }
    }

    pub async fn run(mut self) {
        info!("event worker started");
        while let Some(event) = self.rx.recv().await {
            self.handle(&event).await;
        }
        info!("event worker stopped");
    }

    async fn handle(&self, event: &DomainEvent) {
        if let DomainEvent::Product(ProductEvent::StatusChanged { category_id, .. }) = event {
            if let Err(e) = refresh_category_flag(&self.storage, *category_id).await {
                warn!(%category_id, error = %e, "category flag refresh failed");
            }
        }
        if let Some(nats) = &self.nats {
            let subject = format!("{SUBJECT_PREFIX}.{}", event.subject());
            match serde_json::to_vec(event) {
                Ok(payload) => {
                    if let Err(e) = nats.publish(subject.clone(), payload.into()).await {
                        warn!(%subject, error = %e, "failed to publish event");
                    }
                }
                Err(e) => warn!(%subject, error = %e, "failed to encode event"),
            }
        }
    }
}
