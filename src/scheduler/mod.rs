//! Process-wide scheduler for periodic maintenance jobs.
//!
//! Due-ness is judged against the injected [`Clock`], so tests drive the
//! schedule with a manual clock and [`Scheduler::run_due`] instead of sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::clock::Clock;
use crate::error::Result;

pub mod jobs;

pub use jobs::{IntentExpirySweep, StaleOrderSweep};

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;
    /// Runs one pass; returns how many records it touched.
    async fn run(&self) -> Result<u64>;
}

struct Entry {
    job: Box<dyn Job>,
    every: Duration,
    last_run: Option<DateTime<Utc>>,
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self { Self { clock, entries: Vec::new() } }

    pub fn every(mut self, every: Duration, job: impl Job + 'static) -> Self {
        self.entries.push(Entry { job: Box::new(job), every, last_run: None });
        self
    }

    /// Runs every job whose period has elapsed since its last run. A job that
    /// fails is retried on the next due tick. Returns how many jobs ran.
    pub async fn run_due(&mut self) -> usize {
        let now = self.clock.now();
        let mut ran = 0;
        for entry in &mut self.entries {
            if entry.last_run.is_some_and(|last| now - last < entry.every) { continue; }
            entry.last_run = Some(now);
            ran += 1;
            match entry.job.run().await {
                Ok(0) => debug!(job = entry.job.name(), "nothing to do"),
                Ok(touched) => info!(job = entry.job.name(), touched, "job finished"),
                Err(e) => warn!(job = entry.job.name(), error = %e, "job failed"),
            }
        }
        ran
    }

    pub async fn run(mut self, tick: std::time::Duration) {
        info!(jobs = self.entries.len(), ?tick, "scheduler started");
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.run_due().await;
        }
    }
}
