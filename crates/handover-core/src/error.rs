use crate::machine::Event;
use handover_storage::{CallerRole, PickupStatus, StoreError};
use thiserror::Error;

/// Errors surfaced by pickup operations.
///
/// Validation failures leave the pickup untouched. `TokenExpired` is the one failure that
/// commits a change first: the stale token is marked `expired` before the error is returned.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("pickup not found")]
    NotFound,

    #[error("caller is not a party to this pickup")]
    NotAParty,

    #[error("{role} may not {event} on this pickup")]
    Forbidden { role: CallerRole, event: Event },

    #[error("cannot {event} while pickup is {from}")]
    InvalidTransition { from: PickupStatus, event: Event },

    #[error("invalid dates: {0}")]
    InvalidDates(String),

    #[error("selected date is not one of the proposed dates")]
    InvalidSelection,

    #[error("invalid bonus points: {0}")]
    InvalidPoints(i64),

    #[error("quantity must be a finite number greater than zero")]
    InvalidQuantity,

    #[error("donor and receiver must be different users")]
    InvalidParties,

    #[error("no active token for this pickup")]
    NoActiveToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("token does not match")]
    TokenMismatch,

    #[error("token expiry is out of range")]
    ExpiryOutOfRange,

    #[error("pickup is being modified concurrently; gave up after {attempts} attempts")]
    Contention { attempts: u32 },

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl CoreError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::TokenMismatch
                | CoreError::Contention { .. }
                | CoreError::Store(StoreError::Backend(_))
                | CoreError::Store(StoreError::Conflict)
        )
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CoreError::NotFound,
            other => CoreError::Store(other),
        }
    }
}
