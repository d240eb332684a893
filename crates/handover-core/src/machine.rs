//! Pickup lifecycle transitions.
//!
//! ```text
//! pending ──proposeDates──▶ dates_proposed ──confirmDate──▶ scheduled
//!    ▲            │  ▲                                         │
//!    └────────────┘  └─ proposeDates (overwrite)          requestToken
//!                                                              ▼
//! completed ◀──complete── qr_accepted ◀──presentToken── qr_requested ⟲ requestToken
//!
//! any non-terminal state ──cancel──▶ cancelled
//! ```
//!
//! Every transition here is a pure function of the loaded pickup, the caller and `now`.
//! Persisting the result atomically is the service's job.

use crate::error::CoreError;
use crate::negotiation::DateNegotiator;
use crate::token::{IssuedToken, TokenIssuer, TokenValidator, Validation};
use chrono::{DateTime, Duration, Utc};
use handover_ledger::CreditRequest;
use handover_storage::{
    Caller, CallerRole, Pickup, PickupId, PickupStatus, PointsCredit, ProposedDate,
};
use serde::{Deserialize, Serialize};

/// Lifecycle events, used for guards and error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    ProposeDates,
    ConfirmDate,
    RequestToken,
    PresentToken,
    Complete,
    Cancel,
}

impl Event {
    pub const ALL: [Event; 6] = [
        Event::ProposeDates,
        Event::ConfirmDate,
        Event::RequestToken,
        Event::PresentToken,
        Event::Complete,
        Event::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ProposeDates => "propose dates",
            Event::ConfirmDate => "confirm date",
            Event::RequestToken => "request token",
            Event::PresentToken => "present token",
            Event::Complete => "complete",
            Event::Cancel => "cancel",
        }
    }

    /// States the event may be applied from.
    pub fn allowed_from(&self) -> &'static [PickupStatus] {
        use PickupStatus::*;
        match self {
            Event::ProposeDates => &[Pending, DatesProposed],
            Event::ConfirmDate => &[DatesProposed],
            Event::RequestToken => &[Scheduled, QrRequested],
            Event::PresentToken => &[QrRequested],
            Event::Complete => &[QrAccepted],
            Event::Cancel => &[Pending, DatesProposed, Scheduled, QrRequested, QrAccepted],
        }
    }

    /// Which side of the handover may trigger the event.
    pub fn actor(&self) -> Actor {
        match self {
            Event::ProposeDates | Event::RequestToken | Event::Complete => Actor::Receiver,
            Event::ConfirmDate | Event::PresentToken => Actor::Donor,
            Event::Cancel => Actor::Either,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor {
    Donor,
    Receiver,
    Either,
}

/// Result of a cancel request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The pickup was already cancelled; nothing changed.
    AlreadyCancelled,
}

/// Applies lifecycle events to a loaded pickup.
#[derive(Clone, Debug)]
pub struct PickupStateMachine {
    issuer: TokenIssuer,
}

impl PickupStateMachine {
    pub fn new(token_ttl: Duration) -> Self {
        Self {
            issuer: TokenIssuer::new(token_ttl),
        }
    }

    /// Party check, then state check, then role check.
    pub fn authorize(pickup: &Pickup, caller: &Caller, event: Event) -> Result<(), CoreError> {
        if !pickup.is_party(&caller.user) {
            return Err(CoreError::NotAParty);
        }
        if !event.allowed_from().contains(&pickup.status) {
            return Err(CoreError::InvalidTransition {
                from: pickup.status,
                event,
            });
        }

        let is_donor = caller.user == pickup.donor_ref && caller.role == CallerRole::Donor;
        let is_receiver = caller.user == pickup.receiver_ref
            && caller.role.receiver_kind() == Some(pickup.receiver_kind);
        let permitted = match event.actor() {
            Actor::Donor => is_donor,
            Actor::Receiver => is_receiver,
            Actor::Either => is_donor || is_receiver,
        };
        if !permitted {
            return Err(CoreError::Forbidden {
                role: caller.role,
                event,
            });
        }
        Ok(())
    }

    pub fn propose_dates(
        &self,
        pickup: &mut Pickup,
        caller: &Caller,
        dates: Vec<ProposedDate>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        Self::authorize(pickup, caller, Event::ProposeDates)?;
        DateNegotiator::propose(pickup, dates, now.naive_utc())?;
        pickup.status = PickupStatus::DatesProposed;
        Ok(())
    }

    pub fn confirm_date(
        &self,
        pickup: &mut Pickup,
        caller: &Caller,
        choice: ProposedDate,
    ) -> Result<(), CoreError> {
        Self::authorize(pickup, caller, Event::ConfirmDate)?;
        DateNegotiator::confirm(pickup, choice)?;
        pickup.status = PickupStatus::Scheduled;
        Ok(())
    }

    pub fn request_token(
        &self,
        pickup: &mut Pickup,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, CoreError> {
        Self::authorize(pickup, caller, Event::RequestToken)?;
        if pickup.confirmed_date.is_none() {
            return Err(CoreError::InvalidTransition {
                from: pickup.status,
                event: Event::RequestToken,
            });
        }
        self.issuer.issue(pickup, now)
    }

    pub fn present_token(
        &self,
        pickup: &mut Pickup,
        caller: &Caller,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Validation, CoreError> {
        Self::authorize(pickup, caller, Event::PresentToken)?;
        TokenValidator::validate(pickup, caller.user, secret, now)
    }

    /// Complete the handover and queue the donor's credit in the same change.
    pub fn complete(
        &self,
        pickup: &mut Pickup,
        caller: &Caller,
        notes: Option<String>,
        bonus_points: i64,
        base_points: u32,
        now: DateTime<Utc>,
    ) -> Result<CreditRequest, CoreError> {
        Self::authorize(pickup, caller, Event::Complete)?;
        let bonus = u32::try_from(bonus_points).map_err(|_| CoreError::InvalidPoints(bonus_points))?;

        pickup.status = PickupStatus::Completed;
        pickup.completed_at = Some(now);
        pickup.completion_notes = notes;
        pickup.additional_points = Some(bonus);
        pickup.points_credit = Some(PointsCredit {
            recipient: pickup.donor_ref,
            base_points,
            bonus_points: bonus,
            queued_at: now,
            acknowledged_at: None,
        });

        Ok(CreditRequest {
            pickup_id: pickup.id,
            recipient: pickup.donor_ref,
            base_points,
            bonus_points: bonus,
        })
    }

    pub fn cancel(&self, pickup: &mut Pickup, caller: &Caller) -> Result<CancelOutcome, CoreError> {
        if !pickup.is_party(&caller.user) {
            return Err(CoreError::NotAParty);
        }
        if pickup.status == PickupStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled);
        }
        Self::authorize(pickup, caller, Event::Cancel)?;

        TokenValidator::retire_active(pickup);
        pickup.status = PickupStatus::Cancelled;
        Ok(CancelOutcome::Cancelled)
    }
}

/// Credit request for a completed pickup whose credit has not been acknowledged yet.
pub fn pending_credit(pickup: &Pickup) -> Option<CreditRequest> {
    unacknowledged(pickup.id, pickup.points_credit.as_ref())
}

pub(crate) fn unacknowledged(
    pickup_id: PickupId,
    credit: Option<&PointsCredit>,
) -> Option<CreditRequest> {
    let credit = credit.filter(|c| c.is_pending())?;
    Some(CreditRequest {
        pickup_id,
        recipient: credit.recipient,
        base_points: credit.base_points,
        bonus_points: credit.bonus_points,
    })
}
