//! Caller roles and receiver kinds.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::UserRef;

/// Role an authenticated caller acts under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Donor,
    Ngo,
    CompostAgency,
}

/// Kind of organization receiving a donation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverKind {
    Ngo,
    CompostAgency,
}

/// Error type for parsing roles from strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError(pub String);

impl std::fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid role: {}", self.0)
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for CallerRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donor" => Ok(CallerRole::Donor),
            "ngo" => Ok(CallerRole::Ngo),
            "compost_agency" | "compost-agency" | "compostAgency" => Ok(CallerRole::CompostAgency),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

impl CallerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerRole::Donor => "donor",
            CallerRole::Ngo => "ngo",
            CallerRole::CompostAgency => "compost_agency",
        }
    }

    /// The receiver kind this role acts for, if it is a receiving role.
    pub fn receiver_kind(&self) -> Option<ReceiverKind> {
        match self {
            CallerRole::Donor => None,
            CallerRole::Ngo => Some(ReceiverKind::Ngo),
            CallerRole::CompostAgency => Some(ReceiverKind::CompostAgency),
        }
    }
}

impl std::fmt::Display for CallerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiverKind {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<CallerRole>()?.receiver_kind() {
            Some(kind) => Ok(kind),
            None => Err(ParseRoleError(s.to_string())),
        }
    }
}

impl ReceiverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiverKind::Ngo => "ngo",
            ReceiverKind::CompostAgency => "compost_agency",
        }
    }
}

/// An already-authenticated caller, threaded explicitly through every core operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user: UserRef,
    pub role: CallerRole,
}

impl Caller {
    pub fn new(user: UserRef, role: CallerRole) -> Self {
        Self { user, role }
    }
}
