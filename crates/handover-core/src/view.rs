//! What callers get to see of a pickup.
//!
//! Token secrets are not part of these views. The only way a secret leaves the core is the
//! [`crate::IssuedToken`] handed to the receiver who requested it.

use crate::machine::unacknowledged;
use chrono::{DateTime, Utc};
use handover_ledger::CreditRequest;
use handover_storage::{
    Pickup, PickupId, PickupStatus, PointsCredit, ProposedDate, QrToken, ReceiverKind,
    TokenId, TokenStatus, UserRef,
};
use serde::Serialize;

/// A token's lifecycle without its secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenView {
    pub id: TokenId,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: TokenStatus,
    pub consumed_by: Option<UserRef>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl TokenView {
    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }
}

impl From<&QrToken> for TokenView {
    fn from(token: &QrToken) -> Self {
        Self {
            id: token.id,
            generated_at: token.generated_at,
            expires_at: token.expires_at,
            status: token.status,
            consumed_by: token.consumed_by,
            consumed_at: token.consumed_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PickupView {
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
    pub tokens: Vec<TokenView>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
    pub additional_points: Option<u32>,
    pub points_credit: Option<PointsCredit>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PickupView {
    pub fn active_token(&self) -> Option<&TokenView> {
        self.tokens.iter().find(|t| t.is_active())
    }

    pub fn count_tokens(&self, status: TokenStatus) -> usize {
        self.tokens.iter().filter(|t| t.status == status).count()
    }

    /// The completion credit the ledger has not acknowledged yet, if any.
    pub fn pending_credit(&self) -> Option<CreditRequest> {
        unacknowledged(self.id, self.points_credit.as_ref())
    }
}

impl From<Pickup> for PickupView {
    fn from(pickup: Pickup) -> Self {
        Self {
            id: pickup.id,
            donor_ref: pickup.donor_ref,
            receiver_ref: pickup.receiver_ref,
            receiver_kind: pickup.receiver_kind,
            waste_type: pickup.waste_type,
            item_name: pickup.item_name,
            quantity: pickup.quantity,
            description: pickup.description,
            status: pickup.status,
            proposed_dates: pickup.proposed_dates,
            confirmed_date: pickup.confirmed_date,
            tokens: pickup.tokens.iter().map(TokenView::from).collect(),
            completed_at: pickup.completed_at,
            completion_notes: pickup.completion_notes,
            additional_points: pickup.additional_points,
            points_credit: pickup.points_credit,
            version: pickup.version,
            created_at: pickup.created_at,
            updated_at: pickup.updated_at,
        }
    }
}
