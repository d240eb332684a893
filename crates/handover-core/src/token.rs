//! Single-use QR tokens: issuance and exactly-once consumption.

use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use handover_storage::{Pickup, PickupId, PickupStatus, QrToken, TokenId, TokenStatus, UserRef};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Random bytes behind every token secret.
pub const SECRET_BYTES: usize = 32;

/// Generate a hex-encoded secret from the thread-local CSPRNG.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time comparison of a presented secret against the stored one.
fn secrets_match(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// What the requesting receiver gets back: the secret is the QR payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub pickup_id: PickupId,
    pub token_id: TokenId,
    pub secret: String,
    pub expires_at: DateTime<Utc>,
    /// True when an earlier, still valid token was handed back instead of a new one.
    pub reused: bool,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("pickup_id", &self.pickup_id)
            .field("token_id", &self.token_id)
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("reused", &self.reused)
            .finish()
    }
}

impl IssuedToken {
    fn from_token(pickup_id: PickupId, token: &QrToken, reused: bool) -> Self {
        Self {
            pickup_id,
            token_id: token.id,
            secret: token.secret.clone(),
            expires_at: token.expires_at,
            reused,
        }
    }
}

/// Mints tokens with a fixed lifetime. At most one token per pickup is ever `active`.
#[derive(Clone, Debug)]
pub struct TokenIssuer {
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Hand back the active token if it is still usable, otherwise supersede it and mint a
    /// fresh one. Leaves the pickup in `qr_requested` either way.
    pub fn issue(&self, pickup: &mut Pickup, now: DateTime<Utc>) -> Result<IssuedToken, CoreError> {
        if let Some(token) = pickup.active_token() {
            if token.is_usable_at(now) {
                let issued = IssuedToken::from_token(pickup.id, token, true);
                pickup.status = PickupStatus::QrRequested;
                return Ok(issued);
            }
        }

        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(CoreError::ExpiryOutOfRange)?;
        pickup.status = PickupStatus::QrRequested;

        if let Some(stale) = pickup.active_token_mut() {
            stale.status = TokenStatus::Superseded;
        }

        let token = QrToken {
            id: TokenId::new(),
            secret: generate_secret(),
            generated_at: now,
            expires_at,
            status: TokenStatus::Active,
            consumed_by: None,
            consumed_at: None,
        };
        let issued = IssuedToken::from_token(pickup.id, &token, false);
        pickup.tokens.push(token);
        Ok(issued)
    }
}

/// Outcome of a validation that changed the pickup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validation {
    /// Token consumed; pickup is now `qr_accepted`.
    Accepted { token_id: TokenId },
    /// Token was past its expiry and has been marked `expired`. Must be persisted, then
    /// reported as [`CoreError::TokenExpired`].
    Expired { token_id: TokenId },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokenValidator;

impl TokenValidator {
    /// Check `presented` against the pickup's active token.
    ///
    /// Applied inside a single read-modify-write of the pickup, so of any number of
    /// concurrent presentations of the same token at most one can observe it `active`.
    pub fn validate(
        pickup: &mut Pickup,
        presenter: UserRef,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<Validation, CoreError> {
        let Some(idx) = pickup.tokens.iter().position(QrToken::is_active) else {
            return match pickup.latest_token() {
                Some(token) if token.status == TokenStatus::Expired => {
                    Err(CoreError::TokenExpired)
                }
                _ => Err(CoreError::NoActiveToken),
            };
        };

        let token = &mut pickup.tokens[idx];
        if token.is_expired_at(now) {
            token.status = TokenStatus::Expired;
            return Ok(Validation::Expired { token_id: token.id });
        }

        if !secrets_match(&token.secret, presented) {
            return Err(CoreError::TokenMismatch);
        }

        token.status = TokenStatus::Used;
        token.consumed_by = Some(presenter);
        token.consumed_at = Some(now);
        let token_id = token.id;
        pickup.status = PickupStatus::QrAccepted;

        Ok(Validation::Accepted { token_id })
    }

    /// Mark every active token past its expiry as `expired`. Returns how many were.
    pub fn expire_stale(pickup: &mut Pickup, now: DateTime<Utc>) -> usize {
        let mut swept = 0;
        for token in pickup.tokens.iter_mut() {
            if token.is_active() && token.is_expired_at(now) {
                token.status = TokenStatus::Expired;
                swept += 1;
            }
        }
        swept
    }

    /// Retire the active token, if any, without consuming it.
    pub fn retire_active(pickup: &mut Pickup) {
        if let Some(token) = pickup.active_token_mut() {
            token.status = TokenStatus::Expired;
        }
    }
}
