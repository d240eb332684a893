//! QR verification token records (append-only history on a pickup).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{TokenId, UserRef};

/// Lifecycle of a single token. `Used` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Used,
    Expired,
    Superseded,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Used => "used",
            TokenStatus::Expired => "expired",
            TokenStatus::Superseded => "superseded",
        }
    }
}

impl FromStr for TokenStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TokenStatus::Active),
            "used" => Ok(TokenStatus::Used),
            "expired" => Ok(TokenStatus::Expired),
            "superseded" => Ok(TokenStatus::Superseded),
            _ => Err(format!("invalid token status: {}", s)),
        }
    }
}

/// One issued verification token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrToken {
    pub id: TokenId,
    /// Opaque bearer value shown as the QR payload; never reused across tokens.
    pub secret: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: TokenStatus,
    pub consumed_by: Option<UserRef>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl QrToken {
    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }

    /// Expiry is inclusive of `expires_at`: the token is still valid at that instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Active and not yet past its expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && !self.is_expired_at(now)
    }
}

// The secret stays out of logs.
impl std::fmt::Debug for QrToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrToken")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("generated_at", &self.generated_at)
            .field("expires_at", &self.expires_at)
            .field("status", &self.status)
            .field("consumed_by", &self.consumed_by)
            .field("consumed_at", &self.consumed_at)
            .finish()
    }
}
