use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The four ranked roles. Anything else read from the store resolves to no
/// permissions (fail closed), never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SystemAdmin,
    AreaCoordinator,
    OperationalStaff,
    ExternalPersonnel,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::SystemAdmin,
        Role::AreaCoordinator,
        Role::OperationalStaff,
        Role::ExternalPersonnel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "system_admin",
            Role::AreaCoordinator => "area_coordinator",
            Role::OperationalStaff => "operational_staff",
            Role::ExternalPersonnel => "external_personnel",
        }
    }

    /// Hard-coded capability defaults, used when the role_permissions store
    /// has no rows for a role or is unavailable.
    pub fn default_capabilities(&self) -> &'static [Capability] {
        match self {
            Role::SystemAdmin => &[
                Capability::View,
                Capability::Sign,
                Capability::Manage,
                Capability::Create,
                Capability::Delete,
                Capability::Admin,
            ],
            Role::AreaCoordinator => &[
                Capability::View,
                Capability::Sign,
                Capability::Manage,
                Capability::Create,
            ],
            Role::OperationalStaff => &[Capability::View, Capability::Sign, Capability::Create],
            Role::ExternalPersonnel => &[Capability::View, Capability::Sign],
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system_admin" => Ok(Role::SystemAdmin),
            "area_coordinator" => Ok(Role::AreaCoordinator),
            "operational_staff" => Ok(Role::OperationalStaff),
            "external_personnel" => Ok(Role::ExternalPersonnel),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// Coarse capabilities managed through the role-permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    Sign,
    Manage,
    Create,
    Delete,
    Admin,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Sign => "sign",
            Capability::Manage => "manage",
            Capability::Create => "create",
            Capability::Delete => "delete",
            Capability::Admin => "admin",
        }
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Capability::View),
            "sign" => Ok(Capability::Sign),
            "manage" => Ok(Capability::Manage),
            "create" => Ok(Capability::Create),
            "delete" => Ok(Capability::Delete),
            "admin" => Ok(Capability::Admin),
            _ => Err(()),
        }
    }
}

/// Per-document permission scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    View,
    Sign,
    Manage,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::View => "view",
            PermissionType::Sign => "sign",
            PermissionType::Manage => "manage",
        }
    }
}

impl FromStr for PermissionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(PermissionType::View),
            "sign" => Ok(PermissionType::Sign),
            "manage" => Ok(PermissionType::Manage),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of role -> enabled capability set, either loaded from the store
/// or synthesized from the defaults.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    entries: HashMap<Role, HashSet<Capability>>,
}

impl CapabilityTable {
    pub fn from_defaults() -> Self {
        let mut entries = HashMap::new();
        for role in Role::ALL {
            entries.insert(role, role.default_capabilities().iter().copied().collect());
        }
        Self { entries }
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (Role, Capability, bool)>) -> Self {
        // Start from the defaults so roles absent from the store keep their
        // baseline; stored rows then override per (role, capability).
        let mut table = Self::from_defaults();
        for (role, capability, enabled) in rows {
            let set = table.entries.entry(role).or_default();
            if enabled {
                set.insert(capability);
            } else {
                set.remove(&capability);
            }
        }
        table
    }

    pub fn allows(&self, role: Role, capability: Capability) -> bool {
        self.entries
            .get(&role)
            .map(|set| set.contains(&capability))
            .unwrap_or(false)
    }
}
