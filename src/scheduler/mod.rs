//! # Stage Scheduler
//!
//! Keeps the number of running virtual users close to the ramp target.
//!
//! ```text
//!   tick ──► target_at(elapsed) ──► watch::Sender<RampState>
//!                │                         │
//!                ▼                         ▼
//!   spawn VUs into empty slots      VUs in slots >= target
//!   below the target                retire after their iteration
//! ```
//!
//! VUs own slot numbers. Slot `n` is allowed to run while `n < target`; when
//! the target drops, the highest slots retire first. A retired VU finishes its
//! current iteration (think time is cut short) and exits. When the schedule
//! completes, or the run is interrupted, the target is forced to zero and the
//! scheduler waits up to the graceful-stop timeout before aborting whatever is
//! still running.
//!
//! The live count of running VUs is published through [`ActiveUsers`]; it is
//! what VUs bucket into load levels, so a host that cannot keep up simply
//! reports lower levels.

mod ramp;

pub use ramp::RampSchedule;

use crate::config::ProbeConfig;
use crate::load::RampTrend;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Live count of running VUs.
#[derive(Debug, Clone, Default)]
pub struct ActiveUsers(Arc<AtomicUsize>);

impl ActiveUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    /// Count the caller as running until the guard drops.
    pub fn enter(&self) -> ActiveGuard {
        self.0.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(self.0.clone())
    }
}

/// Decrements [`ActiveUsers`] on drop, including when the task is aborted.
#[derive(Debug)]
pub struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// What the scheduler currently asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampState {
    pub target: usize,
    pub trend: RampTrend,
}

/// A VU's view of the ramp.
#[derive(Debug, Clone)]
pub struct RampSignal {
    slot: usize,
    rx: watch::Receiver<RampState>,
}

impl RampSignal {
    pub fn new(slot: usize, rx: watch::Receiver<RampState>) -> Self {
        Self { slot, rx }
    }

    pub fn trend(&self) -> RampTrend {
        self.rx.borrow().trend
    }

    /// True once the target no longer covers this slot or the scheduler is gone.
    pub fn is_retired(&self) -> bool {
        self.slot >= self.rx.borrow().target || self.rx.has_changed().is_err()
    }

    /// Resolves when this slot is retired.
    pub async fn retired(&mut self) {
        loop {
            if self.slot >= self.rx.borrow_and_update().target {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Everything a spawner needs to start one VU.
#[derive(Debug, Clone)]
pub struct VuSlot {
    pub slot: usize,
    /// Monotonic across the run; distinguishes respawns of the same slot.
    pub spawn_index: u64,
    pub signal: RampSignal,
}

/// How the schedule ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// False when the shutdown future fired before the last stage ended.
    pub completed: bool,
    pub elapsed: Duration,
    pub peak_target: usize,
    pub vus_spawned: u64,
    /// VUs still running after the graceful-stop timeout.
    pub aborted: usize,
}

/// Drives VU spawning and retirement from a [`RampSchedule`].
#[derive(Debug, Clone)]
pub struct StageScheduler {
    schedule: RampSchedule,
    tick: Duration,
    graceful_stop: Duration,
    active: ActiveUsers,
}

impl StageScheduler {
    pub fn new(schedule: RampSchedule, tick: Duration, graceful_stop: Duration) -> Self {
        Self {
            schedule,
            tick,
            graceful_stop,
            active: ActiveUsers::new(),
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            RampSchedule::new(config.stages.clone(), config.ramp.mode),
            config.ramp.tick,
            config.ramp.graceful_stop,
        )
    }

    /// Handle on the running-VU gauge; spawned VUs should hold an [`ActiveGuard`].
    pub fn active_users(&self) -> ActiveUsers {
        self.active.clone()
    }

    /// Run the schedule to completion or until `shutdown` resolves.
    pub async fn run<S, F>(&self, mut spawn: S, shutdown: F) -> ScheduleOutcome
    where
        S: FnMut(VuSlot) -> JoinHandle<()>,
        F: Future<Output = ()>,
    {
        let (tx, _keep) = watch::channel(RampState {
            target: 0,
            trend: RampTrend::Rising,
        });
        let start = Instant::now();
        let mut slots: Vec<Option<JoinHandle<()>>> = Vec::new();
        let mut spawned = 0u64;
        let mut peak = 0usize;
        let mut last_target = None;

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let completed = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!(elapsed_s = start.elapsed().as_secs(), "Shutdown requested, stopping ramp");
                    break false;
                }
                _ = interval.tick() => {}
            }

            let elapsed = start.elapsed();
            let Some(target) = self.schedule.target_at(elapsed) else {
                break true;
            };
            let trend = self.schedule.trend_at(elapsed);
            tx.send_replace(RampState { target, trend });
            peak = peak.max(target);

            if last_target != Some(target) {
                info!(
                    target,
                    active = self.active.get(),
                    trend = ?trend,
                    elapsed_s = elapsed.as_secs(),
                    "Ramp target changed"
                );
                last_target = Some(target);
            }

            if slots.len() < target {
                slots.resize_with(target, || None);
            }
            for (slot, handle) in slots.iter_mut().enumerate().take(target) {
                if handle.as_ref().is_some_and(|h| !h.is_finished()) {
                    continue;
                }
                debug!(slot, spawn_index = spawned, "Spawning virtual user");
                *handle = Some(spawn(VuSlot {
                    slot,
                    spawn_index: spawned,
                    signal: RampSignal::new(slot, tx.subscribe()),
                }));
                spawned += 1;
            }
        };

        tx.send_replace(RampState {
            target: 0,
            trend: RampTrend::Falling,
        });
        let running = slots.iter().flatten().filter(|h| !h.is_finished()).count();
        info!(
            completed,
            running,
            graceful_stop_s = self.graceful_stop.as_secs(),
            "Schedule finished, waiting for virtual users"
        );

        let deadline = Instant::now() + self.graceful_stop;
        let mut aborted = 0;
        for mut handle in slots.into_iter().flatten() {
            if timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(aborted, "Aborted virtual users after graceful-stop timeout");
        }

        ScheduleOutcome {
            completed,
            elapsed: start.elapsed(),
            peak_target: peak,
            vus_spawned: spawned,
            aborted,
        }
    }
}
