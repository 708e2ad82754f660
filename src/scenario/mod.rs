//! # Workload Scenarios
//!
//! Each VU iteration runs exactly one workload category, drawn from a
//! weighted [`ScenarioMix`]:
//!
//! | Category | Default weight | Operations | Base expected time |
//! |---|---|---|---|
//! | Core | 0.60 | profile, documents, contacts, templates | 1000ms |
//! | ResourceIntensive | 0.25 | dashboard stats, document search, contact export | 2000ms |
//! | HealthCheck | 0.15 | configuration, profile | 500ms |
//!
//! The [`ScenarioDispatcher`] walks the category's operation list in order,
//! timing every call and judging it against a status rule and a
//! load-scaled expected duration (see [`crate::tolerance`]). Every call is
//! recorded whether it succeeded or not; failures never cut an iteration
//! short.

mod catalog;
mod dispatcher;
mod mix;

pub use catalog::{plan_for, ScenarioPlan, StatusCheck};
pub use dispatcher::{IterationOutcome, ScenarioDispatcher};
pub use mix::{ScenarioKind, ScenarioMix};
