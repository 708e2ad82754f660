use crate::config::ScenarioWeights;
use rand::Rng;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Workload category executed by one VU iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Core,
    ResourceIntensive,
    HealthCheck,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::Core,
        ScenarioKind::ResourceIntensive,
        ScenarioKind::HealthCheck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioKind::Core => "core",
            ScenarioKind::ResourceIntensive => "resource_intensive",
            ScenarioKind::HealthCheck => "health_check",
        }
    }
}

impl Display for ScenarioKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical distribution over [`ScenarioKind`]s.
///
/// Holds cumulative upper bounds; a draw `u` in `[0, 1)` selects the first
/// kind whose bound is strictly greater than `u`. A draw that lands exactly on
/// a bound therefore belongs to the kind whose range starts there.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioMix {
    bounds: Vec<(ScenarioKind, f64)>,
}

impl Default for ScenarioMix {
    fn default() -> Self {
        Self::from_weights(&ScenarioWeights::default())
    }
}

impl ScenarioMix {
    /// Build from config weights. Weights are normalised; zero-weight kinds are never drawn.
    pub fn from_weights(weights: &ScenarioWeights) -> Self {
        Self::from_table(&[
            (ScenarioKind::Core, weights.core),
            (ScenarioKind::ResourceIntensive, weights.resource_intensive),
            (ScenarioKind::HealthCheck, weights.health_check),
        ])
    }

    /// Build from an explicit `(kind, weight)` table, in draw order.
    pub fn from_table(table: &[(ScenarioKind, f64)]) -> Self {
        let total: f64 = table.iter().map(|(_, w)| w.max(0.0)).sum();
        let mut cumulative = 0.0;
        let mut bounds = Vec::with_capacity(table.len());
        for (kind, weight) in table {
            let weight = weight.max(0.0);
            if weight == 0.0 {
                continue;
            }
            cumulative += if total > 0.0 { weight / total } else { 0.0 };
            bounds.push((*kind, cumulative));
        }
        Self { bounds }
    }

    /// Map a uniform draw to a kind.
    pub fn select(&self, u: f64) -> ScenarioKind {
        self.bounds
            .iter()
            .find(|(_, bound)| u < *bound)
            .or_else(|| self.bounds.last())
            .map(|(kind, _)| *kind)
            .unwrap_or(ScenarioKind::Core)
    }

    /// Draw a kind from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ScenarioKind {
        self.select(rng.gen::<f64>())
    }

    /// Normalised probability of `kind`.
    pub fn probability(&self, kind: ScenarioKind) -> f64 {
        let mut previous = 0.0;
        for (k, bound) in &self.bounds {
            if *k == kind {
                return bound - previous;
            }
            previous = *bound;
        }
        0.0
    }
}
