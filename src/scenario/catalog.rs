use super::ScenarioKind;
use crate::client::{ApiOperation, Resource};
use std::time::Duration;

/// How a response status is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    /// Only `200 OK` counts.
    Ok,
    /// Anything below 500 counts.
    BelowServerError,
}

impl StatusCheck {
    pub fn passes(self, status: u16) -> bool {
        match self {
            StatusCheck::Ok => status == 200,
            StatusCheck::BelowServerError => status < 500,
        }
    }
}

/// Fixed execution plan for one workload category.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioPlan {
    pub kind: ScenarioKind,
    pub operations: &'static [ApiOperation],
    /// Expected duration at the lowest tolerance; scaled by the load-level multiplier.
    pub base_expected: Duration,
    pub status_check: StatusCheck,
    /// Pause after each operation.
    pub inter_op_delay: Duration,
}

const PROFILE: ApiOperation = ApiOperation {
    name: "profile",
    resource: Resource::Profile,
    path: "",
    query: &[],
};

const CORE_OPERATIONS: &[ApiOperation] = &[
    PROFILE,
    ApiOperation {
        name: "documents.list",
        resource: Resource::Documents,
        path: "",
        query: &[("page", "1"), ("limit", "10")],
    },
    ApiOperation {
        name: "contacts.list",
        resource: Resource::Contacts,
        path: "",
        query: &[("page", "1"), ("limit", "10")],
    },
    ApiOperation {
        name: "templates.list",
        resource: Resource::Templates,
        path: "",
        query: &[],
    },
];

const RESOURCE_INTENSIVE_OPERATIONS: &[ApiOperation] = &[
    ApiOperation {
        name: "statistics.dashboard",
        resource: Resource::Statistics,
        path: "/dashboard",
        query: &[("range", "30d")],
    },
    ApiOperation {
        name: "documents.search",
        resource: Resource::Documents,
        path: "/search",
        query: &[("q", "contract"), ("limit", "100")],
    },
    ApiOperation {
        name: "contacts.export",
        resource: Resource::Contacts,
        path: "/export",
        query: &[("format", "json")],
    },
];

const HEALTH_CHECK_OPERATIONS: &[ApiOperation] = &[
    ApiOperation {
        name: "configuration.get",
        resource: Resource::Configuration,
        path: "",
        query: &[],
    },
    PROFILE,
];

const CORE: ScenarioPlan = ScenarioPlan {
    kind: ScenarioKind::Core,
    operations: CORE_OPERATIONS,
    base_expected: Duration::from_millis(1000),
    status_check: StatusCheck::Ok,
    inter_op_delay: Duration::from_millis(300),
};

const RESOURCE_INTENSIVE: ScenarioPlan = ScenarioPlan {
    kind: ScenarioKind::ResourceIntensive,
    operations: RESOURCE_INTENSIVE_OPERATIONS,
    base_expected: Duration::from_millis(2000),
    status_check: StatusCheck::BelowServerError,
    inter_op_delay: Duration::from_millis(500),
};

const HEALTH_CHECK: ScenarioPlan = ScenarioPlan {
    kind: ScenarioKind::HealthCheck,
    operations: HEALTH_CHECK_OPERATIONS,
    base_expected: Duration::from_millis(500),
    status_check: StatusCheck::Ok,
    inter_op_delay: Duration::from_millis(200),
};

/// The plan executed for `kind`.
pub fn plan_for(kind: ScenarioKind) -> &'static ScenarioPlan {
    match kind {
        ScenarioKind::Core => &CORE,
        ScenarioKind::ResourceIntensive => &RESOURCE_INTENSIVE,
        ScenarioKind::HealthCheck => &HEALTH_CHECK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans_shape() {
        assert_eq!(plan_for(ScenarioKind::Core).operations.len(), 4);
        assert_eq!(plan_for(ScenarioKind::ResourceIntensive).operations.len(), 3);
        assert_eq!(plan_for(ScenarioKind::HealthCheck).operations.len(), 2);
        for kind in ScenarioKind::ALL {
            let plan = plan_for(kind);
            assert_eq!(plan.kind, kind);
            assert!(plan.inter_op_delay >= Duration::from_millis(200));
            assert!(plan.inter_op_delay <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_status_checks() {
        assert!(StatusCheck::Ok.passes(200));
        assert!(!StatusCheck::Ok.passes(201));
        assert!(StatusCheck::BelowServerError.passes(404));
        assert!(!StatusCheck::BelowServerError.passes(500));
    }
}
