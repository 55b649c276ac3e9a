//! OpenSASE Marketplace - order fulfillment and payment service

use anyhow::Result;
use opensase_marketplace::{
    api, scheduler::{IntentExpirySweep, Scheduler, StaleOrderSweep}, worker::{EventSink, EventWorker},
    AppConfig, Clock, Marketplace, MemoryStorage, PgStorage, Storage, SystemClock,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = AppConfig::from_env()?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events stay local");
                None
            }
        },
        None => None,
    };

    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            serve(PgStorage::new(pool), &config, nats).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            serve(MemoryStorage::new(), &config, nats).await
        }
    }
}

async fn serve<S: Storage>(storage: S, config: &AppConfig, nats: Option<async_nats::Client>) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (sink, rx) = EventSink::channel(config.event_queue_capacity);
    let market = Marketplace::new(storage.clone(), clock.clone(), sink, config.settings());

    tokio::spawn(EventWorker::new(storage, rx, nats).run());
    let sweep_every = config.sweep_interval()?;
    let scheduler = Scheduler::new(clock)
        .every(sweep_every, IntentExpirySweep::new(market.clone()))
        .every(sweep_every, StaleOrderSweep::new(market.clone()));
    tokio::spawn(scheduler.run(std::time::Duration::from_secs(config.sweep_interval_secs)));

    let app = api::router(market);
    tracing::info!("🚀 OpenSASE Marketplace listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
