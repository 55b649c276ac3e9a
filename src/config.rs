//! Environment configuration

use chrono::Duration;
use std::env;
use std::str::FromStr;
use crate::error::{MarketError, Result};
use crate::services::MarketSettings;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Without a database the in-memory backend is used.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub intent_ttl_minutes: i64,
    pub reservation_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
    pub event_queue_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let raw = |name: &str, default: &str| (name.to_string(), text(name).unwrap_or_else(|| default.to_string()));

        let config = Self {
            port: parse(raw("PORT", "8083"))?,
            database_url: text("DATABASE_URL"),
            database_max_connections: parse(raw("DATABASE_MAX_CONNECTIONS", "10"))?,
            nats_url: text("NATS_URL"),
            intent_ttl_minutes: parse(raw("PAYMENT_INTENT_TTL_MINUTES", "30"))?,
            reservation_ttl_minutes: parse(raw("ORDER_RESERVATION_TTL_MINUTES", "1440"))?,
            sweep_interval_secs: parse(raw("SWEEP_INTERVAL_SECS", "60"))?,
            event_queue_capacity: parse(raw("EVENT_QUEUE_CAPACITY", "1024"))?,
        };
        if config.intent_ttl_minutes <= 0 || config.reservation_ttl_minutes <= 0 {
            return Err(MarketError::Config("TTL values must be positive".into()));
        }
        if config.sweep_interval_secs == 0 {
            return Err(MarketError::Config("SWEEP_INTERVAL_SECS must be positive".into()));
        }
        config.sweep_interval()?;
        Ok(config)
    }

    /// Sweep cadence on the market clock.
    pub fn sweep_interval(&self) -> Result<Duration> {
        Duration::from_std(std::time::Duration::from_secs(self.sweep_interval_secs))
            .map_err(|e| MarketError::Config(format!("SWEEP_INTERVAL_SECS out of range: {e}")))
    }

    pub fn settings(&self) -> MarketSettings {
        MarketSettings {
            intent_ttl: Duration::minutes(self.intent_ttl_minutes),
            reservation_ttl: Duration::minutes(self.reservation_ttl_minutes),
        }
    }
}

fn parse<T: FromStr>((name, raw): (String, String)) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| MarketError::Config(format!("Invalid {name} '{raw}': {e}")))
}
