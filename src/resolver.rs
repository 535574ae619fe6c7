use crate::registry::{ComponentRole, FeatureGateRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gate name to explicit enablement, as found in the instance configuration.
pub type OverrideMap = BTreeMap<String, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateStatus {
    Enabled,
    Disabled,
}

impl GateStatus {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            GateStatus::Enabled
        } else {
            GateStatus::Disabled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Enabled => "Enabled",
            GateStatus::Disabled => "Disabled",
        }
    }
}

/// One entry of a feature-gate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub component: String,
    pub name: String,
    pub status: GateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Computes the effective state of every gate visible to `role`.
///
/// Overrides win over compiled defaults; override keys that name no gate
/// for this role are ignored. The result is sorted by gate name and the
/// function never fails, so an empty map simply yields the defaults.
pub fn resolve(
    registry: &FeatureGateRegistry,
    role: ComponentRole,
    overrides: &OverrideMap,
) -> Vec<Response> {
    let platform = registry.platform();
    let mut report: Vec<Response> = registry
        .lookup(role)
        .into_iter()
        .map(|gate| {
            let enabled = overrides
                .get(gate.name())
                .copied()
                .unwrap_or_else(|| gate.default_enabled(platform));
            Response {
                component: role.label().to_string(),
                name: gate.name().to_string(),
                status: GateStatus::from_enabled(enabled),
                version: gate.maturity().label().map(str::to_string),
            }
        })
        .collect();
    report.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    report
}

/// Override keys that do not affect the report for `role`.
pub fn unknown_overrides<'a>(
    registry: &FeatureGateRegistry,
    role: ComponentRole,
    overrides: &'a OverrideMap,
) -> Vec<&'a str> {
    let visible = registry.lookup(role);
    overrides
        .keys()
        .filter(|key| !visible.iter().any(|gate| gate.name() == key.as_str()))
        .map(String::as_str)
        .collect()
}
