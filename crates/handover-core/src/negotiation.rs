//! Pickup date negotiation: the receiver proposes candidates, the donor picks one.

use crate::error::CoreError;
use chrono::{NaiveDate, NaiveDateTime};
use handover_storage::{Pickup, ProposedDate, TimeSlot, MAX_PROPOSED_DATES};
use std::collections::HashSet;

/// Validates and applies date proposals and confirmations.
///
/// Only the data is checked here; who may call and from which state is decided by
/// [`crate::PickupStateMachine`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DateNegotiator;

impl DateNegotiator {
    /// Parse a `YYYY-MM-DD` date and an `H:00 AM|PM` slot into a candidate.
    pub fn parse_candidate(date: &str, time_slot: &str) -> Result<ProposedDate, CoreError> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| CoreError::InvalidDates(format!("malformed date {date:?}")))?;
        let time_slot: TimeSlot = time_slot
            .parse()
            .map_err(|e: handover_storage::ParseTimeSlotError| {
                CoreError::InvalidDates(e.to_string())
            })?;
        Ok(ProposedDate::new(date, time_slot))
    }

    /// Check a proposal against the bookable window: 1 to 3 distinct entries, none starting
    /// before `now` (UTC). A slot that begins exactly at `now` is still bookable.
    pub fn validate(dates: &[ProposedDate], now: NaiveDateTime) -> Result<(), CoreError> {
        if dates.is_empty() {
            return Err(CoreError::InvalidDates(
                "at least one date is required".to_string(),
            ));
        }
        if dates.len() > MAX_PROPOSED_DATES {
            return Err(CoreError::InvalidDates(format!(
                "at most {MAX_PROPOSED_DATES} dates may be proposed, got {}",
                dates.len()
            )));
        }

        let mut seen = HashSet::with_capacity(dates.len());
        for candidate in dates {
            if candidate.starts_at() < now {
                return Err(CoreError::InvalidDates(format!("{candidate} is in the past")));
            }
            if !seen.insert(candidate) {
                return Err(CoreError::InvalidDates(format!(
                    "{candidate} was proposed twice"
                )));
            }
        }
        Ok(())
    }

    /// Replace the pickup's proposal set. Any earlier, unconfirmed proposal is discarded.
    pub fn propose(
        pickup: &mut Pickup,
        dates: Vec<ProposedDate>,
        now: NaiveDateTime,
    ) -> Result<(), CoreError> {
        Self::validate(&dates, now)?;
        pickup.proposed_dates = dates;
        Ok(())
    }

    /// Record `choice` as the confirmed date if it exactly matches a proposed entry.
    pub fn confirm(pickup: &mut Pickup, choice: ProposedDate) -> Result<(), CoreError> {
        if !pickup.proposed_dates.contains(&choice) {
            return Err(CoreError::InvalidSelection);
        }
        pickup.confirmed_date = Some(choice);
        Ok(())
    }
}
