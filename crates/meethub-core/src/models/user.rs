use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform role, used by the route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    BusinessOwner,
    Pm,
    Member,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::BusinessOwner, Role::Pm, Role::Member];

    /// Wire name of the role (`admin`, `business-owner`, `pm`, `member`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::BusinessOwner => "business-owner",
            Role::Pm => "pm",
            Role::Member => "member",
        }
    }

    /// Get the display name for this role.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::BusinessOwner => "Business Owner",
            Role::Pm => "Project Manager",
            Role::Member => "Member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "business-owner" | "business_owner" => Ok(Role::BusinessOwner),
            "pm" => Ok(Role::Pm),
            "member" => Ok(Role::Member),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// The signed-in user, persisted alongside the session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}
