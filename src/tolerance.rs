//! Latency tolerance and pacing policy.
//!
//! Both lookups are pure step functions. The multiplier widens the acceptable
//! duration of an operation as load rises so that expected queueing does not
//! show up as failures, while outright hangs still fail. Think time shrinks in
//! the heavier phases to keep pressure on the target.

use crate::load::{LoadLevel, Phase};
use std::time::Duration;

/// Multiplier applied to an operation's base expected time.
pub fn tolerance_multiplier(level: LoadLevel) -> u32 {
    match level.get() {
        0..=50 => 2,
        51..=100 => 3,
        101..=200 => 4,
        201..=300 => 5,
        _ => 6,
    }
}

/// Pause between two iterations of the same VU.
pub fn think_time(phase: Phase) -> Duration {
    match phase {
        Phase::Baseline => Duration::from_millis(2000),
        Phase::Moderate => Duration::from_millis(1500),
        Phase::High => Duration::from_millis(1000),
        Phase::Extreme => Duration::from_millis(500),
        Phase::Breaking => Duration::from_millis(300),
        Phase::Recovery => Duration::from_millis(2000),
    }
}

/// Longest duration an operation may take at `level` and still count as a success.
pub fn expected_ceiling(base: Duration, level: LoadLevel) -> Duration {
    base * tolerance_multiplier(level)
}
