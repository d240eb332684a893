//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the handover core depends on.
///
/// Each pickup record (tokens included) is the unit of mutual exclusion. Writers go through
/// [`Store::update_pickup`], which is a compare-and-swap on [`Pickup::version`]; reads need
/// no exclusivity.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Pickups ────────────────────────────────────────

    /// Create a pickup in `pending` (returns the stored record, version 0).
    async fn create_pickup(&self, params: &CreatePickupParams) -> Result<Pickup, StoreError>;

    /// Get a pickup by ID.
    async fn get_pickup(&self, pickup_id: &PickupId) -> Result<Pickup, StoreError>;

    /// List every pickup where the user is donor or receiver, newest first.
    async fn list_pickups_for_party(&self, party: &UserRef) -> Result<Vec<Pickup>, StoreError>;

    /// List every pickup currently in the given status.
    async fn list_pickups_by_status(
        &self,
        status: PickupStatus,
    ) -> Result<Vec<Pickup>, StoreError>;

    /// Persist a modified pickup.
    ///
    /// Succeeds only if the stored version still equals `pickup.version`; returns the record
    /// as stored (version bumped, `updated_at` refreshed). A stale version yields
    /// [`StoreError::Conflict`], a missing record [`StoreError::NotFound`].
    async fn update_pickup(&self, pickup: &Pickup) -> Result<Pickup, StoreError>;

    /// Administrative delete.
    async fn delete_pickup(&self, pickup_id: &PickupId) -> Result<(), StoreError>;
}
