//! Points ledger abstraction for completed pickups.
//!
//! The ledger is an external collaborator: the core only needs it to accept one earn
//! transaction per pickup, idempotently. This crate defines the `PointsLedger` trait and an
//! in-memory implementation for single-process deployments and tests. A durable SQL-backed
//! ledger lives in `handover-store-sqlite`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use handover_storage::{PickupId, UserRef};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use uuid::Uuid;

/// A request to credit loyalty points for one completed pickup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRequest {
    /// Idempotency key: at most one transaction per pickup.
    pub pickup_id: PickupId,
    pub recipient: UserRef,
    pub base_points: u32,
    pub bonus_points: u32,
}

impl CreditRequest {
    pub fn total_points(&self) -> u64 {
        u64::from(self.base_points) + u64::from(self.bonus_points)
    }
}

/// Acknowledgement of a credit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAck {
    pub transaction_id: Uuid,
    pub credited_at: DateTime<Utc>,
    /// True when the pickup had already been credited and nothing new was recorded.
    pub duplicate: bool,
}

/// Error type for ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Ledger that records an earn transaction for a pickup.
#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Credit the pickup's recipient exactly once.
    ///
    /// Repeating the call for the same `pickup_id` must not credit again; it returns the
    /// original transaction with `duplicate = true`.
    async fn credit_once(&self, request: &CreditRequest) -> Result<CreditAck, LedgerError>;
}

#[derive(Clone, Debug)]
struct CreditRecord {
    request: CreditRequest,
    transaction_id: Uuid,
    credited_at: DateTime<Utc>,
}

/// In-memory ledger keyed by pickup.
///
/// Also counts every `credit_once` call and can be switched offline, which is what tests
/// use to observe delivery behaviour.
#[derive(Default)]
pub struct MemoryLedger {
    credits: DashMap<PickupId, CreditRecord>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `credit_once` calls received, duplicates and failures included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of distinct pickups credited.
    pub fn credited(&self) -> usize {
        self.credits.len()
    }

    pub fn credit_for(&self, pickup_id: &PickupId) -> Option<CreditRequest> {
        self.credits.get(pickup_id).map(|r| r.request.clone())
    }

    /// Total points credited to a recipient across all pickups.
    pub fn balance(&self, recipient: &UserRef) -> u64 {
        self.credits
            .iter()
            .filter(|r| r.request.recipient == *recipient)
            .map(|r| r.request.total_points())
            .sum()
    }

    /// Make subsequent calls fail with `LedgerError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl PointsLedger for MemoryLedger {
    async fn credit_once(&self, request: &CreditRequest) -> Result<CreditAck, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger is offline".to_string()));
        }

        match self.credits.entry(request.pickup_id) {
            Entry::Occupied(existing) => {
                let record = existing.get();
                tracing::debug!(pickup_id = %request.pickup_id, "duplicate credit ignored");
                Ok(CreditAck {
                    transaction_id: record.transaction_id,
                    credited_at: record.credited_at,
                    duplicate: true,
                })
            }
            Entry::Vacant(slot) => {
                let record = CreditRecord {
                    request: request.clone(),
                    transaction_id: Uuid::now_v7(),
                    credited_at: Utc::now(),
                };
                let ack = CreditAck {
                    transaction_id: record.transaction_id,
                    credited_at: record.credited_at,
                    duplicate: false,
                };
                slot.insert(record);
                Ok(ack)
            }
        }
    }
}
