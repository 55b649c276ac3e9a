//! OpenSASE Marketplace
//!
//! Order fulfillment and payment consistency engine for a multi-seller
//! marketplace.
//!
//! ## Features
//! - Atomic order assembly with row-locked stock reservation
//! - Immutable price snapshots per line item
//! - Idempotent payment intent state machine
//! - Product and store listing lifecycle
//! - Background sweeps for expired intents and stale reservations

pub mod api;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod repository;
pub mod scheduler;
pub mod services;
pub mod worker;

pub use clock::{Clock, SystemClock};
pub use config::AppConfig;
pub use error::{ErrorKind, MarketError, Result};
pub use repository::{MemoryStorage, PgStorage, Storage, UnitOfWork};
pub use services::{MarketSettings, Marketplace, OrderLine};
