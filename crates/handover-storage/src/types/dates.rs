//! Pickup date candidates and the fixed set of hourly time slots.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// First bookable slot (24h clock).
pub const FIRST_SLOT_HOUR: u8 = 8;
/// Last bookable slot (24h clock).
pub const LAST_SLOT_HOUR: u8 = 18;

/// One hourly pickup slot, written `"10:00 AM"` / `"2:00 PM"`.
///
/// Slots are enumerated rather than free-form so that confirming a proposed date is an
/// exact-match comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot(u8);

/// Error type for parsing a TimeSlot from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeSlotError(pub String);

impl std::fmt::Display for ParseTimeSlotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid time slot: {}", self.0)
    }
}

impl std::error::Error for ParseTimeSlotError {}

impl TimeSlot {
    /// Build a slot from a 24h hour; `None` when outside the bookable window.
    pub fn from_hour(hour: u8) -> Option<Self> {
        (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
            .contains(&hour)
            .then_some(Self(hour))
    }

    pub fn hour(&self) -> u8 {
        self.0
    }

    /// Time of day the slot begins.
    pub fn start_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.0), 0, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Every bookable slot, earliest first.
    pub fn all() -> impl Iterator<Item = TimeSlot> {
        (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR).map(TimeSlot)
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hour, suffix) = match self.0 {
            0 => (12, "AM"),
            h @ 1..=11 => (h, "AM"),
            12 => (12, "PM"),
            h => (h - 12, "PM"),
        };
        write!(f, "{}:00 {}", hour, suffix)
    }
}

impl FromStr for TimeSlot {
    type Err = ParseTimeSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeSlotError(s.to_string());

        let (clock, suffix) = s.trim().split_once(' ').ok_or_else(err)?;
        let (hour, minutes) = clock.split_once(':').ok_or_else(err)?;
        if minutes != "00" {
            return Err(err());
        }
        let hour: u8 = hour.parse().map_err(|_| err())?;
        if !(1..=12).contains(&hour) {
            return Err(err());
        }
        let hour = match suffix.to_ascii_uppercase().as_str() {
            "AM" => hour % 12,
            "PM" => hour % 12 + 12,
            _ => return Err(err()),
        };

        TimeSlot::from_hour(hour).ok_or_else(err)
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = ParseTimeSlotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}

/// A candidate (or confirmed) pickup date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposedDate {
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
}

impl ProposedDate {
    pub fn new(date: NaiveDate, time_slot: TimeSlot) -> Self {
        Self { date, time_slot }
    }

    /// UTC wall-clock start of the slot on its date.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time_slot.start_time())
    }
}

impl std::fmt::Display for ProposedDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date, self.time_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_morning_and_afternoon_slots() {
        assert_eq!("10:00 AM".parse::<TimeSlot>().unwrap().hour(), 10);
        assert_eq!("2:00 PM".parse::<TimeSlot>().unwrap().hour(), 14);
        assert_eq!("12:00 PM".parse::<TimeSlot>().unwrap().hour(), 12);
        assert_eq!("6:00 pm".parse::<TimeSlot>().unwrap().hour(), 18);
    }

    #[test]
    fn test_rejects_slots_outside_window() {
        assert!("7:00 AM".parse::<TimeSlot>().is_err());
        assert!("7:00 PM".parse::<TimeSlot>().is_err());
        assert!("12:00 AM".parse::<TimeSlot>().is_err());
    }

    #[test]
    fn test_rejects_free_form_times() {
        assert!("10:30 AM".parse::<TimeSlot>().is_err());
        assert!("10 AM".parse::<TimeSlot>().is_err());
        assert!("14:00".parse::<TimeSlot>().is_err());
        assert!("13:00 PM".parse::<TimeSlot>().is_err());
        assert!("".parse::<TimeSlot>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for slot in TimeSlot::all() {
            assert_eq!(slot.to_string().parse::<TimeSlot>().unwrap(), slot);
        }
        assert_eq!(TimeSlot::all().count(), 11);
    }

    #[test]
    fn test_slot_serializes_as_label() {
        let slot: TimeSlot = "2:00 PM".parse().unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "\"2:00 PM\"");
        assert!(serde_json::from_str::<TimeSlot>("\"3:15 PM\"").is_err());
    }

    #[test]
    fn test_proposed_date_equality_is_exact() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 11).unwrap();
        let a = ProposedDate::new(date, "2:00 PM".parse().unwrap());
        let b = ProposedDate::new(date, "3:00 PM".parse().unwrap());
        assert_ne!(a, b);
        assert_eq!(a, ProposedDate::new(date, TimeSlot::from_hour(14).unwrap()));
    }
}
