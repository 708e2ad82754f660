//! # Load Levels and Phases
//!
//! Every sample the probe records is tagged with a [`LoadLevel`]: a discrete
//! concurrency bucket drawn from a fixed ascending set ([`LoadLevels`]).
//! The bucket is computed from the number of VUs running at the moment an
//! iteration starts, so all components agree on the level without storing it
//! per VU.
//!
//! Bucketing maps a concurrency value to the smallest configured level that is
//! greater than or equal to it. With stage targets `[10, 25, 50]`, 7 active VUs
//! are tagged `10`, 11 are tagged `25`, and anything above 50 is tagged `50`.
//!
//! [`Phase`] is a named band of load levels. It drives think time and is
//! reported alongside each session.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A discrete concurrency bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadLevel(pub usize);

impl LoadLevel {
    pub fn get(self) -> usize {
        self.0
    }
}

impl Display for LoadLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ascending set of load levels used for tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadLevels {
    levels: Vec<usize>,
}

impl LoadLevels {
    /// Build a level set from arbitrary values.
    ///
    /// Zeroes are dropped, the rest is sorted and de-duplicated. Returns `None`
    /// when nothing is left.
    pub fn new(values: impl IntoIterator<Item = usize>) -> Option<Self> {
        let mut levels: Vec<usize> = values.into_iter().filter(|v| *v > 0).collect();
        levels.sort_unstable();
        levels.dedup();
        if levels.is_empty() {
            None
        } else {
            Some(Self { levels })
        }
    }

    /// Map the current active concurrency to its bucket.
    pub fn level_for(&self, active_concurrency: usize) -> LoadLevel {
        let idx = self.levels.partition_point(|l| *l < active_concurrency);
        let level = self
            .levels
            .get(idx)
            .or_else(|| self.levels.last())
            .copied()
            .unwrap_or(active_concurrency);
        LoadLevel(level)
    }

    pub fn max(&self) -> LoadLevel {
        LoadLevel(self.levels.last().copied().unwrap_or(0))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.levels
    }
}

/// Direction of the ramp at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampTrend {
    Rising,
    Holding,
    Falling,
}

/// Named band of load levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Baseline,
    Moderate,
    High,
    Extreme,
    Breaking,
    Recovery,
}

impl Phase {
    /// Phase of a load level while the ramp is not falling.
    pub fn from_level(level: LoadLevel) -> Self {
        match level.0 {
            0..=25 => Phase::Baseline,
            26..=100 => Phase::Moderate,
            101..=200 => Phase::High,
            201..=300 => Phase::Extreme,
            _ => Phase::Breaking,
        }
    }

    /// Phase for an iteration, taking the ramp direction into account.
    ///
    /// A falling ramp is always `Recovery`, whatever the level.
    pub fn for_iteration(level: LoadLevel, trend: RampTrend) -> Self {
        match trend {
            RampTrend::Falling => Phase::Recovery,
            RampTrend::Rising | RampTrend::Holding => Self::from_level(level),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Baseline => "baseline",
            Phase::Moderate => "moderate",
            Phase::High => "high",
            Phase::Extreme => "extreme",
            Phase::Breaking => "breaking",
            Phase::Recovery => "recovery",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
