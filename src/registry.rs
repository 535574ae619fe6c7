//! Compiled-in feature-gate registry.
//!
//! The registry is built once at start-up and shared read-only (usually
//! behind an `Arc`) by every request. Reduced registries for tests come from
//! [`FeatureGateRegistry::builder`].

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Operating system family the defaults are evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Maturity {
    Alpha,
    Beta,
    #[serde(rename = "GA")]
    Ga,
}

impl Maturity {
    /// Label shown in reports. Stable gates carry none.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Maturity::Alpha => Some("ALPHA"),
            Maturity::Beta => Some("BETA"),
            Maturity::Ga => None,
        }
    }
}

/// Operating mode of the process reporting its gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ComponentRole {
    Agent,
    AgentWindows,
    Controller,
}

impl ComponentRole {
    pub fn label(&self) -> &'static str {
        match self {
            ComponentRole::Agent => "agent",
            ComponentRole::AgentWindows => "agent-windows",
            ComponentRole::Controller => "controller",
        }
    }

    /// Key of the configuration entry holding this role's settings.
    pub fn config_entry(&self) -> &'static str {
        match self {
            ComponentRole::Agent | ComponentRole::AgentWindows => "antrea-agent.conf",
            ComponentRole::Controller => "antrea-controller.conf",
        }
    }
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Default enablement of a gate, optionally depending on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultState {
    Fixed(bool),
    PerPlatform { linux: bool, windows: bool },
}

impl DefaultState {
    pub fn enabled_on(&self, platform: Platform) -> bool {
        match (self, platform) {
            (DefaultState::Fixed(enabled), _) => *enabled,
            (DefaultState::PerPlatform { linux, .. }, Platform::Linux) => *linux,
            (DefaultState::PerPlatform { windows, .. }, Platform::Windows) => *windows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGateDefinition {
    name: &'static str,
    maturity: Maturity,
    default: DefaultState,
    roles: &'static [ComponentRole],
}

impl FeatureGateDefinition {
    /// `roles` lists the roles that declare the gate directly. Listing
    /// [`ComponentRole::AgentWindows`] marks a gate as Windows-specific; the
    /// Windows agent otherwise inherits the Agent set minus the deny-list.
    pub const fn new(
        name: &'static str,
        maturity: Maturity,
        default: DefaultState,
        roles: &'static [ComponentRole],
    ) -> Self {
        Self {
            name,
            maturity,
            default,
            roles,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn maturity(&self) -> Maturity {
        self.maturity
    }

    pub fn default_state(&self) -> DefaultState {
        self.default
    }

    pub fn default_enabled(&self, platform: Platform) -> bool {
        self.default.enabled_on(platform)
    }

    pub fn declares(&self, role: ComponentRole) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("feature gate {name} registered more than once")]
    DuplicateGate { name: &'static str },
    #[error("windows deny-list names unknown feature gate {name}")]
    UnknownDenyListEntry { name: &'static str },
}

#[derive(Debug, Clone)]
pub struct FeatureGateRegistry {
    platform: Platform,
    gates: Vec<FeatureGateDefinition>,
    windows_unsupported: BTreeSet<&'static str>,
}

impl FeatureGateRegistry {
    pub fn builder() -> FeatureGateRegistryBuilder {
        FeatureGateRegistryBuilder::new()
    }

    /// Registry of every Antrea gate, evaluated for the running platform.
    pub fn antrea() -> Self {
        Self::antrea_for(Platform::current())
    }

    pub fn antrea_for(platform: Platform) -> Self {
        Self::assemble(
            platform,
            ANTREA_FEATURE_GATES.to_vec(),
            UNSUPPORTED_ON_WINDOWS.iter().copied().collect(),
        )
    }

    fn assemble(
        platform: Platform,
        mut gates: Vec<FeatureGateDefinition>,
        windows_unsupported: BTreeSet<&'static str>,
    ) -> Self {
        gates.sort_by(|a, b| a.name.cmp(b.name));
        Self {
            platform,
            gates,
            windows_unsupported,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureGateDefinition> {
        self.gates.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureGateDefinition> {
        self.gates
            .binary_search_by(|gate| gate.name.cmp(name))
            .ok()
            .map(|idx| &self.gates[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_unsupported_on_windows(&self, name: &str) -> bool {
        self.windows_unsupported.contains(name)
    }

    /// Gates visible to `role`, ordered by name.
    pub fn lookup(&self, role: ComponentRole) -> Vec<&FeatureGateDefinition> {
        self.gates
            .iter()
            .filter(|gate| self.applies(gate, role))
            .collect()
    }

    fn applies(&self, gate: &FeatureGateDefinition, role: ComponentRole) -> bool {
        match role {
            ComponentRole::Agent | ComponentRole::Controller => gate.declares(role),
            ComponentRole::AgentWindows => {
                gate.declares(ComponentRole::AgentWindows)
                    || (gate.declares(ComponentRole::Agent)
                        && !self.windows_unsupported.contains(gate.name))
            }
        }
    }
}

pub struct FeatureGateRegistryBuilder {
    platform: Platform,
    gates: Vec<FeatureGateDefinition>,
    windows_unsupported: Vec<&'static str>,
}

impl Default for FeatureGateRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureGateRegistryBuilder {
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
            gates: Vec::new(),
            windows_unsupported: Vec::new(),
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn gate(mut self, gate: FeatureGateDefinition) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn unsupported_on_windows(mut self, name: &'static str) -> Self {
        self.windows_unsupported.push(name);
        self
    }

    pub fn build(self) -> Result<FeatureGateRegistry, RegistryError> {
        let mut names = BTreeSet::new();
        for gate in &self.gates {
            if !names.insert(gate.name) {
                return Err(RegistryError::DuplicateGate { name: gate.name });
            }
        }
        let mut deny = BTreeSet::new();
        for name in self.windows_unsupported {
            if !names.contains(name) {
                return Err(RegistryError::UnknownDenyListEntry { name });
            }
            deny.insert(name);
        }
        Ok(FeatureGateRegistry::assemble(
            self.platform,
            self.gates,
            deny,
        ))
    }
}

const AGENT: &[ComponentRole] = &[ComponentRole::Agent];
const CONTROLLER: &[ComponentRole] = &[ComponentRole::Controller];
const AGENT_AND_CONTROLLER: &[ComponentRole] = &[ComponentRole::Agent, ComponentRole::Controller];

const ENABLED: DefaultState = DefaultState::Fixed(true);
const DISABLED: DefaultState = DefaultState::Fixed(false);
const LINUX_ONLY: DefaultState = DefaultState::PerPlatform {
    linux: true,
    windows: false,
};

static ANTREA_FEATURE_GATES: &[FeatureGateDefinition] = &[
    FeatureGateDefinition::new("AdminNetworkPolicy", Maturity::Alpha, DISABLED, CONTROLLER),
    FeatureGateDefinition::new("AntreaIPAM", Maturity::Alpha, DISABLED, AGENT_AND_CONTROLLER),
    FeatureGateDefinition::new("AntreaPolicy", Maturity::Beta, ENABLED, AGENT_AND_CONTROLLER),
    FeatureGateDefinition::new("AntreaProxy", Maturity::Beta, ENABLED, AGENT),
    FeatureGateDefinition::new(
        "CleanupStaleUDPSvcConntrack",
        Maturity::Alpha,
        DISABLED,
        AGENT,
    ),
    FeatureGateDefinition::new("Egress", Maturity::Beta, LINUX_ONLY, AGENT_AND_CONTROLLER),
    FeatureGateDefinition::new("EndpointSlice", Maturity::Ga, ENABLED, AGENT),
    FeatureGateDefinition::new("ExternalNode", Maturity::Alpha, DISABLED, AGENT),
    FeatureGateDefinition::new("FlowExporter", Maturity::Alpha, DISABLED, AGENT),
    FeatureGateDefinition::new("IPsecCertAuth", Maturity::Alpha, DISABLED, AGENT_AND_CONTROLLER),
    FeatureGateDefinition::new(
        "L7NetworkPolicy",
        Maturity::Alpha,
        DISABLED,
        AGENT_AND_CONTROLLER,
    ),
    FeatureGateDefinition::new("LoadBalancerModeDSR", Maturity::Alpha, DISABLED, AGENT),
    FeatureGateDefinition::new("Multicast", Maturity::Beta, LINUX_ONLY, AGENT_AND_CONTROLLER),
    FeatureGateDefinition::new("Multicluster", Maturity::Alpha, DISABLED, AGENT_AND_CONTROLLER),
    FeatureGateDefinition::new(
        "NetworkPolicyStats",
        Maturity::Beta,
        ENABLED,
        AGENT_AND_CONTROLLER,
    ),
    FeatureGateDefinition::new("NodeIPAM", Maturity::Beta, ENABLED, CONTROLLER),
    FeatureGateDefinition::new("NodePortLocal", Maturity::Beta, ENABLED, AGENT),
    FeatureGateDefinition::new("SecondaryNetwork", Maturity::Alpha, DISABLED, AGENT),
    FeatureGateDefinition::new(
        "ServiceExternalIP",
        Maturity::Alpha,
        DISABLED,
        AGENT_AND_CONTROLLER,
    ),
    FeatureGateDefinition::new(
        "SupportBundleCollection",
        Maturity::Alpha,
        DISABLED,
        AGENT_AND_CONTROLLER,
    ),
    FeatureGateDefinition::new("TopologyAwareHints", Maturity::Beta, ENABLED, AGENT),
    FeatureGateDefinition::new("Traceflow", Maturity::Beta, ENABLED, AGENT_AND_CONTROLLER),
    FeatureGateDefinition::new("TrafficControl", Maturity::Alpha, DISABLED, AGENT),
];

// Agent gates with no meaning on Windows nodes.
static UNSUPPORTED_ON_WINDOWS: &[&str] = &[
    "AntreaIPAM",
    "CleanupStaleUDPSvcConntrack",
    "Egress",
    "IPsecCertAuth",
    "L7NetworkPolicy",
    "LoadBalancerModeDSR",
    "Multicast",
    "Multicluster",
    "SecondaryNetwork",
    "ServiceExternalIP",
];
