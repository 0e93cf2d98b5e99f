//! Background jobs: the 1 Hz tick and the periodic durability snapshot.
//!
//! Both run as tokio tasks. Missed tick instants are skipped, never burst.
//! The snapshot job copies state under the engine's locks and then writes
//! it on the blocking pool, so the tick path never waits on disk.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::engine::ForceEngine;
use crate::error::PersistError;
use crate::lock;

/// Cadence of the accrual tick.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct TickScheduler {
    engine: Arc<ForceEngine>,
    tick_period: Duration,
    snapshot_interval: Duration,
    jobs: Mutex<Option<Jobs>>,
    ticks: Arc<AtomicU64>,
}

/// One started generation of the two jobs.
struct Jobs {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Jobs {
    fn stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

impl TickScheduler {
    pub fn new(engine: Arc<ForceEngine>) -> Self {
        let snapshot_interval = engine.settings().snapshot_interval;
        Self {
            engine,
            tick_period: TICK_PERIOD,
            snapshot_interval,
            jobs: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Override the tick period (harnesses and tests).
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period.max(Duration::from_millis(1));
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn engine(&self) -> &Arc<ForceEngine> {
        &self.engine
    }

    /// Tick passes completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.jobs).as_ref().is_some_and(|jobs| !jobs.stopped())
    }

    /// Spawn both jobs on the current tokio runtime. A second call while
    /// running does nothing; a call after `stop()` starts them again.
    pub fn start(&self) {
        let mut jobs = lock(&self.jobs);
        if jobs.as_ref().is_some_and(|j| !j.stopped()) {
            log::warn!("PvP tick scheduler already started");
            return;
        }

        // Stopped jobs from an earlier start exit on their own once their
        // sender is replaced here.
        let (stop_tx, _) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(run_ticks(
                Arc::clone(&self.engine),
                self.tick_period,
                stop_tx.subscribe(),
                Arc::clone(&self.ticks),
            )),
            tokio::spawn(run_snapshots(
                Arc::clone(&self.engine),
                self.snapshot_interval,
                stop_tx.subscribe(),
            )),
        ];
        *jobs = Some(Jobs { stop_tx, tasks });
        log::info!(
            "PvP tick scheduler started (tick {:?}, snapshot {:?})",
            self.tick_period,
            self.snapshot_interval
        );
    }

    /// Signal both jobs to stop. An in-flight tick finishes first.
    /// Calling it again is harmless.
    pub fn stop(&self) {
        if let Some(jobs) = lock(&self.jobs).as_ref() {
            jobs.stop_tx.send_replace(true);
        }
    }

    /// Stop both jobs, wait for them, then persist once more. The final
    /// write runs on the calling task.
    pub async fn shutdown(&self) -> Result<(), PersistError> {
        let jobs = lock(&self.jobs).take();
        if let Some(jobs) = jobs {
            jobs.stop_tx.send_replace(true);
            for task in jobs.tasks {
                if let Err(e) = task.await {
                    log::error!("PvP scheduler task ended abnormally: {}", e);
                }
            }
        }
        let result = self.engine.persist();
        if result.is_ok() {
            log::info!("PvP state saved on shutdown");
        }
        result
    }
}

async fn run_ticks(
    engine: Arc<ForceEngine>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    ticks: Arc<AtomicU64>,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                engine.tick();
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    log::debug!("PvP tick job stopped");
}

async fn run_snapshots(engine: Arc<ForceEngine>, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut interval = time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
            _ = engine.save_requested().notified() => {}
        }

        let snapshot = engine.snapshot();
        let writer = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || writer.write_snapshot(&snapshot)).await {
            Ok(Ok(())) => log::debug!("PvP snapshot written"),
            // Already logged by the engine; the next interval retries.
            Ok(Err(_)) => {}
            Err(e) => log::error!("PvP snapshot worker failed: {}", e),
        }
    }
    log::debug!("PvP snapshot job stopped");
}
