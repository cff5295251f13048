//! Capability registry: which agent roles can execute which task categories.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::AgentRole;

/// A named skill an agent may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Planning,
    Coding,
    Review,
    Debugging,
    Testing,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Coding => "coding",
            Self::Review => "review",
            Self::Debugging => "debugging",
            Self::Testing => "testing",
        }
    }

    pub fn all() -> [Capability; 5] {
        [
            Self::Planning,
            Self::Coding,
            Self::Review,
            Self::Debugging,
            Self::Testing,
        ]
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static mapping from agent role to the capabilities it can execute.
///
/// Extending the ensemble with a new role means adding an `AgentRole` variant
/// and registering its capability set here; there is no subclassing.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    roles: BTreeMap<AgentRole, BTreeSet<Capability>>,
}

impl CapabilityRegistry {
    /// Empty registry; roles are added as agents register with the pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering the full standard ensemble.
    ///
    /// Secondary capabilities mirror what each specialist can credibly do
    /// beyond its primary skill: a debugger implements fixes, a tester
    /// validates, a coder writes its own tests.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for role in AgentRole::all() {
            registry.register_role(role);
        }
        registry
    }

    /// Register a role with its standard capability set.
    pub fn register_role(&mut self, role: AgentRole) {
        self.roles
            .entry(role)
            .or_insert_with(|| Self::standard_capabilities(role));
    }

    /// Register a role with an explicit capability set, merging with any
    /// set registered earlier for the same role.
    pub fn register_role_with(&mut self, role: AgentRole, capabilities: BTreeSet<Capability>) {
        self.roles.entry(role).or_default().extend(capabilities);
    }

    /// The built-in capability set for a role.
    pub fn standard_capabilities(role: AgentRole) -> BTreeSet<Capability> {
        let capabilities: &[Capability] = match role {
            AgentRole::Planner => &[Capability::Planning],
            AgentRole::Coder => &[Capability::Coding, Capability::Testing],
            AgentRole::Reviewer => &[Capability::Review],
            AgentRole::Debugger => &[Capability::Debugging, Capability::Coding],
            AgentRole::Tester => &[Capability::Testing, Capability::Review],
        };
        capabilities.iter().copied().collect()
    }

    pub fn supports(&self, role: AgentRole, capability: Capability) -> bool {
        self.roles
            .get(&role)
            .is_some_and(|set| set.contains(&capability))
    }

    pub fn capabilities_for(&self, role: AgentRole) -> Option<&BTreeSet<Capability>> {
        self.roles.get(&role)
    }

    /// Roles registered here that can execute the given capability.
    pub fn roles_for(&self, capability: Capability) -> Vec<AgentRole> {
        self.roles
            .iter()
            .filter(|(_, set)| set.contains(&capability))
            .map(|(role, _)| *role)
            .collect()
    }

    /// Whether any registered role can execute the capability.
    pub fn is_available(&self, capability: Capability) -> bool {
        self.roles.values().any(|set| set.contains(&capability))
    }

    pub fn registered_roles(&self) -> impl Iterator<Item = AgentRole> + '_ {
        self.roles.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
