//! Pickup lifecycle core.
//!
//! Drives a pickup from creation through date negotiation and a single-use QR handover to
//! completion, when the donor is credited loyalty points exactly once.
//!
//! The pieces:
//! - [`PickupStateMachine`]: pure transition rules, party and role guards
//! - [`DateNegotiator`]: validation of proposed and confirmed dates
//! - [`TokenIssuer`] / [`TokenValidator`]: secret minting and exactly-once consumption
//! - [`PickupService`]: atomic read-modify-write against a [`handover_storage::Store`],
//!   followed by ledger delivery and counterpart notification
//! - [`PickupView`]: what callers see of a pickup, never including token secrets

mod clock;
mod config;
mod error;
mod machine;
mod negotiation;
mod service;
mod token;
mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use error::CoreError;
pub use machine::{pending_credit, Actor, CancelOutcome, Event, PickupStateMachine};
pub use negotiation::DateNegotiator;
pub use service::PickupService;
pub use token::{generate_secret, IssuedToken, TokenIssuer, TokenValidator, Validation};
pub use view::{PickupView, TokenView};
