use crate::config::{LoadStage, RampMode};
use crate::load::RampTrend;
use std::time::Duration;

/// Target user count as a function of elapsed run time.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    stages: Vec<LoadStage>,
    mode: RampMode,
}

impl RampSchedule {
    pub fn new(stages: Vec<LoadStage>, mode: RampMode) -> Self {
        Self { stages, mode }
    }

    pub fn stages(&self) -> &[LoadStage] {
        &self.stages
    }

    pub fn mode(&self) -> RampMode {
        self.mode
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest stage target.
    pub fn peak(&self) -> usize {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Index of the stage running at `elapsed`, with its start offset.
    pub fn stage_at(&self, elapsed: Duration) -> Option<(usize, Duration)> {
        let mut start = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            let end = start + stage.duration;
            if elapsed < end {
                return Some((index, start));
            }
            start = end;
        }
        None
    }

    /// Target user count at `elapsed`; `None` once the schedule is over.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let (index, start) = self.stage_at(elapsed)?;
        let stage = &self.stages[index];
        Some(match self.mode {
            RampMode::Step => stage.target,
            RampMode::Linear => {
                let from = self.previous_target(index) as f64;
                let to = stage.target as f64;
                let progress = (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
                (from + (to - from) * progress).round() as usize
            }
        })
    }

    /// Direction of the stage running at `elapsed`.
    pub fn trend_at(&self, elapsed: Duration) -> RampTrend {
        let Some((index, _)) = self.stage_at(elapsed) else {
            return RampTrend::Falling;
        };
        let previous = self.previous_target(index);
        let target = self.stages[index].target;
        match target.cmp(&previous) {
            std::cmp::Ordering::Greater => RampTrend::Rising,
            std::cmp::Ordering::Equal => RampTrend::Holding,
            std::cmp::Ordering::Less => RampTrend::Falling,
        }
    }

    fn previous_target(&self, index: usize) -> usize {
        index
            .checked_sub(1)
            .map(|i| self.stages[i].target)
            .unwrap_or(0)
    }
}
