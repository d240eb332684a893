//! The pickup service: atomic read-modify-write over the store, plus the collaborator calls
//! that follow a committed change.

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::machine::{pending_credit, CancelOutcome, PickupStateMachine};
use crate::token::{IssuedToken, TokenValidator, Validation};
use crate::view::PickupView;
use chrono::{DateTime, Utc};
use handover_events::{EventBus, EventType, PickupEvent};
use handover_ledger::{CreditRequest, PointsLedger};
use handover_storage::{
    Caller, CreatePickupParams, Pickup, PickupId, PickupStatus, ProposedDate, Store, StoreError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PickupService {
    store: Arc<dyn Store>,
    ledger: Arc<dyn PointsLedger>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    machine: PickupStateMachine,
    config: CoreConfig,
}

impl PickupService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn PointsLedger>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            events,
            clock,
            machine: PickupStateMachine::new(config.token_ttl),
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ───────────────────────────────────── Queries ────────────────────────────────────────

    pub async fn create_pickup(
        &self,
        params: &CreatePickupParams,
    ) -> Result<PickupView, CoreError> {
        if !params.quantity.is_finite() || params.quantity <= 0.0 {
            return Err(CoreError::InvalidQuantity);
        }
        if params.donor_ref == params.receiver_ref {
            return Err(CoreError::InvalidParties);
        }

        let pickup = self.store.create_pickup(params).await?;
        info!(pickup_id = %pickup.id, waste_type = %pickup.waste_type, "Pickup created");
        Ok(pickup.into())
    }

    /// One pickup, as seen by one of its parties.
    pub async fn get_pickup(
        &self,
        pickup_id: &PickupId,
        caller: &Caller,
    ) -> Result<PickupView, CoreError> {
        let pickup = self.store.get_pickup(pickup_id).await?;
        if !pickup.is_party(&caller.user) {
            return Err(CoreError::NotAParty);
        }
        Ok(pickup.into())
    }

    /// Every pickup where the caller is donor or receiver.
    pub async fn list_pickups(&self, caller: &Caller) -> Result<Vec<PickupView>, CoreError> {
        let pickups = self.store.list_pickups_for_party(&caller.user).await?;
        Ok(pickups.into_iter().map(PickupView::from).collect())
    }

    // ──────────────────────────────────── Transitions ─────────────────────────────────────

    pub async fn propose_dates(
        &self,
        pickup_id: &PickupId,
        caller: &Caller,
        dates: Vec<ProposedDate>,
    ) -> Result<PickupView, CoreError> {
        let (pickup, ()) = self
            .mutate(pickup_id, |p, now| {
                self.machine.propose_dates(p, caller, dates.clone(), now)
            })
            .await?;
        info!(pickup_id = %pickup.id, count = pickup.proposed_dates.len(), "Dates proposed");
        self.notify(&pickup, caller, EventType::DatesProposed);
        Ok(pickup.into())
    }

    pub async fn confirm_date(
        &self,
        pickup_id: &PickupId,
        caller: &Caller,
        choice: ProposedDate,
    ) -> Result<PickupView, CoreError> {
        let (pickup, ()) = self
            .mutate(pickup_id, |p, _| self.machine.confirm_date(p, caller, choice))
            .await?;
        info!(pickup_id = %pickup.id, date = %choice, "Pickup scheduled");
        self.notify(&pickup, caller, EventType::DateConfirmed);
        Ok(pickup.into())
    }

    /// Issue (or re-hand) the QR token for a scheduled pickup.
    pub async fn request_token(
        &self,
        pickup_id: &PickupId,
        caller: &Caller,
    ) -> Result<IssuedToken, CoreError> {
        let (pickup, issued) = self
            .mutate(pickup_id, |p, now| self.machine.request_token(p, caller, now))
            .await?;
        if issued.reused {
            debug!(pickup_id = %pickup.id, token_id = %issued.token_id, "Active token reused");
        } else {
            info!(
                pickup_id = %pickup.id,
                token_id = %issued.token_id,
                expires_at = %issued.expires_at,
                "Token issued"
            );
            self.notify(&pickup, caller, EventType::TokenIssued);
        }
        Ok(issued)
    }

    /// Present a scanned secret. Exactly one presentation of a given token can succeed.
    pub async fn present_token(
        &self,
        pickup_id: &PickupId,
        caller: &Caller,
        secret: &str,
    ) -> Result<PickupView, CoreError> {
        let (pickup, outcome) = self
            .mutate(pickup_id, |p, now| {
                self.machine.present_token(p, caller, secret, now)
            })
            .await?;
        match outcome {
            Validation::Accepted { token_id } => {
                info!(pickup_id = %pickup.id, token_id = %token_id, "Token accepted");
                self.notify(&pickup, caller, EventType::TokenAccepted);
                Ok(pickup.into())
            }
            Validation::Expired { token_id } => {
                info!(pickup_id = %pickup.id, token_id = %token_id, "Token expired on presentation");
                Err(CoreError::TokenExpired)
            }
        }
    }

    /// Complete the pickup and credit the donor.
    ///
    /// The credit is queued in the same write as the transition; delivery to the ledger
    /// happens afterwards and a ledger outage leaves it queued for
    /// [`PickupService::redeliver_pending_credits`].
    pub async fn complete(
        &self,
        pickup_id: &PickupId,
        caller: &Caller,
        notes: Option<String>,
        bonus_points: i64,
    ) -> Result<PickupView, CoreError> {
        let base_points = self.config.base_points;
        let (pickup, request) = self
            .mutate(pickup_id, |p, now| {
                self.machine
                    .complete(p, caller, notes.clone(), bonus_points, base_points, now)
            })
            .await?;
        info!(
            pickup_id = %pickup.id,
            points = request.total_points(),
            "Pickup completed"
        );
        self.notify(&pickup, caller, EventType::Completed);

        Ok(self.deliver_credit(&request).await.unwrap_or(pickup).into())
    }

    pub async fn cancel(
        &self,
        pickup_id: &PickupId,
        caller: &Caller,
    ) -> Result<PickupView, CoreError> {
        let (pickup, outcome) = self
            .mutate(pickup_id, |p, _| self.machine.cancel(p, caller))
            .await?;
        if outcome == CancelOutcome::Cancelled {
            info!(pickup_id = %pickup.id, by = %caller.role, "Pickup cancelled");
            self.notify(&pickup, caller, EventType::Cancelled);
        }
        Ok(pickup.into())
    }

    // ──────────────────────────────────── Maintenance ─────────────────────────────────────

    /// Mark every active-but-expired token as `expired`. Returns how many were swept.
    pub async fn sweep_expired_tokens(&self) -> Result<usize, CoreError> {
        let candidates = self
            .store
            .list_pickups_by_status(PickupStatus::QrRequested)
            .await?;

        let mut swept = 0;
        for pickup in candidates {
            let now = self.clock.now();
            if !pickup
                .active_token()
                .is_some_and(|t| t.is_expired_at(now))
            {
                continue;
            }
            match self
                .mutate(&pickup.id, |p, now| Ok(TokenValidator::expire_stale(p, now)))
                .await
            {
                Ok((_, n)) => swept += n,
                // Deleted between listing and sweeping.
                Err(CoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }

        if swept > 0 {
            info!(swept, "Expired tokens swept");
        }
        Ok(swept)
    }

    /// Retry every queued, unacknowledged completion credit. Returns how many the ledger
    /// acknowledged.
    pub async fn redeliver_pending_credits(&self) -> Result<usize, CoreError> {
        let completed = self
            .store
            .list_pickups_by_status(PickupStatus::Completed)
            .await?;

        let mut delivered = 0;
        for pickup in completed {
            let Some(request) = pending_credit(&pickup) else {
                continue;
            };
            if self.deliver_credit(&request).await.is_some() {
                delivered += 1;
            }
        }

        if delivered > 0 {
            info!(delivered, "Queued credits redelivered");
        }
        Ok(delivered)
    }

    // ───────────────────────────────────── Internals ──────────────────────────────────────

    /// Load, apply, compare-and-swap. Retries with exponential backoff while other writers
    /// keep winning the version race.
    ///
    /// `apply` must be a pure function of the loaded pickup and `now`. If it leaves the
    /// pickup unchanged nothing is written.
    async fn mutate<T, F>(&self, pickup_id: &PickupId, mut apply: F) -> Result<(Pickup, T), CoreError>
    where
        F: FnMut(&mut Pickup, DateTime<Utc>) -> Result<T, CoreError>,
    {
        let attempts = self.config.max_attempts;
        let mut backoff = self.config.retry_backoff;

        for attempt in 1..=attempts {
            let loaded = self.store.get_pickup(pickup_id).await?;
            let mut pickup = loaded.clone();
            let outcome = apply(&mut pickup, self.clock.now())?;
            if pickup == loaded {
                return Ok((pickup, outcome));
            }

            match self.store.update_pickup(&pickup).await {
                Ok(stored) => return Ok((stored, outcome)),
                Err(StoreError::Conflict) => {
                    debug!(pickup_id = %pickup_id, attempt, "Pickup write lost version race");
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(pickup_id = %pickup_id, attempts, "Giving up on contended pickup");
        Err(CoreError::Contention { attempts })
    }

    /// Send a queued credit to the ledger and record the acknowledgement.
    ///
    /// Returns the updated pickup on acknowledgement, `None` if the credit stays queued.
    async fn deliver_credit(&self, request: &CreditRequest) -> Option<Pickup> {
        let ack = match self.ledger.credit_once(request).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(
                    pickup_id = %request.pickup_id,
                    error = %e,
                    "Points ledger unavailable; credit stays queued"
                );
                return None;
            }
        };
        if ack.duplicate {
            debug!(pickup_id = %request.pickup_id, "Ledger already held this credit");
        }

        let recorded = self
            .mutate(&request.pickup_id, |p, now| {
                if let Some(credit) = p.points_credit.as_mut() {
                    if credit.acknowledged_at.is_none() {
                        credit.acknowledged_at = Some(now);
                    }
                }
                Ok(())
            })
            .await;

        match recorded {
            Ok((pickup, ())) => {
                info!(
                    pickup_id = %pickup.id,
                    transaction_id = %ack.transaction_id,
                    "Points credited"
                );
                Some(pickup)
            }
            Err(e) => {
                // The ledger is idempotent, so a later redelivery just re-acknowledges.
                warn!(
                    pickup_id = %request.pickup_id,
                    error = %e,
                    "Failed to record ledger acknowledgement"
                );
                None
            }
        }
    }

    /// Tell the counterpart about a committed change, off the caller's path.
    fn notify(&self, pickup: &Pickup, actor: &Caller, event_type: EventType) {
        let Some(recipient) = pickup.counterpart_of(&actor.user) else {
            return;
        };
        let event = PickupEvent {
            event_type,
            pickup_id: pickup.id,
            status: pickup.status,
            timestamp: self.clock.now().timestamp_millis(),
        };
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = events.publish(&recipient, event).await {
                warn!(recipient = %recipient, error = %e, "Failed to deliver pickup notification");
            }
        });
    }
}
