//! Pickup records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{PickupId, ProposedDate, QrToken, ReceiverKind, TokenStatus, UserRef};

/// Most candidate dates a receiver may propose at once.
pub const MAX_PROPOSED_DATES: usize = 3;

/// Lifecycle state of a pickup. `Completed` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Pending,
    DatesProposed,
    Scheduled,
    QrRequested,
    QrAccepted,
    Completed,
    Cancelled,
}

impl PickupStatus {
    pub const ALL: [PickupStatus; 7] = [
        PickupStatus::Pending,
        PickupStatus::DatesProposed,
        PickupStatus::Scheduled,
        PickupStatus::QrRequested,
        PickupStatus::QrAccepted,
        PickupStatus::Completed,
        PickupStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PickupStatus::Pending => "pending",
            PickupStatus::DatesProposed => "dates_proposed",
            PickupStatus::Scheduled => "scheduled",
            PickupStatus::QrRequested => "qr_requested",
            PickupStatus::QrAccepted => "qr_accepted",
            PickupStatus::Completed => "completed",
            PickupStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PickupStatus::Completed | PickupStatus::Cancelled)
    }
}

impl std::fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PickupStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid pickup status: {}", s))
    }
}

/// Loyalty credit recorded in the same write that completes a pickup.
///
/// `acknowledged_at` stays `None` until the points ledger accepts the credit; a queued,
/// unacknowledged credit is redelivered later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsCredit {
    pub recipient: UserRef,
    pub base_points: u32,
    pub bonus_points: u32,
    pub queued_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl PointsCredit {
    pub fn is_pending(&self) -> bool {
        self.acknowledged_at.is_none()
    }
}

/// One donor-to-receiver handover.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub id: PickupId,
    pub donor_ref: UserRef,
    pub receiver_ref: UserRef,
    pub receiver_kind: ReceiverKind,
    pub waste_type: String,
    pub item_name: String,
    pub quantity: f64,
    pub description: Option<String>,
    pub status: PickupStatus,
    pub proposed_dates: Vec<ProposedDate>,
    pub confirmed_date: Option<ProposedDate>,
    pub tokens: Vec<QrToken>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
    pub additional_points: Option<u32>,
    pub points_credit: Option<PointsCredit>,
    /// Compare-and-swap guard; bumped by the store on every successful update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pickup {
    pub fn is_party(&self, user: &UserRef) -> bool {
        self.donor_ref == *user || self.receiver_ref == *user
    }

    /// The other party of the handover, if `user` is one of them.
    pub fn counterpart_of(&self, user: &UserRef) -> Option<UserRef> {
        if *user == self.donor_ref {
            Some(self.receiver_ref)
        } else if *user == self.receiver_ref {
            Some(self.donor_ref)
        } else {
            None
        }
    }

    /// The single active token, if any.
    pub fn active_token(&self) -> Option<&QrToken> {
        self.tokens.iter().find(|t| t.is_active())
    }

    pub fn active_token_mut(&mut self) -> Option<&mut QrToken> {
        self.tokens.iter_mut().find(|t| t.is_active())
    }

    pub fn latest_token(&self) -> Option<&QrToken> {
        self.tokens.last()
    }

    pub fn count_tokens(&self, status: TokenStatus) -> usize {
        self.tokens.iter().filter(|t| t.status == status).count()
    }
}

/// Parameters for creating a pickup once a receiver accepts a donation
#[derive(Clone, Debug)]
pub struct CreatePickupParams {
    pub donor_ref: UserRef,
    pub receiver_ref: UserRef,
    pub receiver_kind: ReceiverKind,
    pub waste_type: String,
    pub item_name: String,
    pub quantity: f64,
    pub description: Option<String>,
}
