//! The Principal/Role model (spec §3), shared by the HTTP security chain
//! and the WebSocket gateway.

use serde::{Deserialize, Serialize};

/// A user's role, with a total order matching spec §3: `Developer <
/// TeamLead < Manager < Admin`. Declaration order is the order used by
/// the derived `PartialOrd`/`Ord`, replacing ad hoc numeric-role
/// comparisons with a typed, exhaustively-matchable enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Developer,
    TeamLead,
    Manager,
    Admin,
}

impl Role {
    /// Whether this role satisfies a minimum required role.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    fn as_str(self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::TeamLead => "team_lead",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "developer" | "DEVELOPER" => Ok(Role::Developer),
            "team_lead" | "TEAM_LEAD" => Ok(Role::TeamLead),
            "manager" | "MANAGER" => Ok(Role::Manager),
            "admin" | "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The authenticated identity for a connection or request (spec §3).
///
/// Constructed once on token verification and held for the life of its
/// bearer connection/request; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque, immutable user id.
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub team_ids: Vec<String>,
    pub active: bool,
}

impl Principal {
    /// The anonymous principal used when no credential is presented.
    pub fn anonymous() -> Self {
        Self {
            user_id: String::new(),
            display_name: "anonymous".to_string(),
            role: Role::Developer,
            team_ids: Vec::new(),
            active: false,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }

    pub fn has_team(&self, team_id: &str) -> bool {
        self.team_ids.iter().any(|t| t == team_id)
    }
}
