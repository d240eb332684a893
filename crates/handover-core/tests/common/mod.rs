//! Shared harness for service-level tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use handover_core::{CoreConfig, ManualClock, PickupService, PickupView};
use handover_events::EventBus;
use handover_events_memory::MemoryEventBus;
use handover_ledger::MemoryLedger;
use handover_storage::{
    Caller, CallerRole, CreatePickupParams, ProposedDate, ReceiverKind, Store, UserRef,
};
use handover_store_sqlite::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 2025-01-10 09:00 UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap()
}

pub fn slot(date: &str, time_slot: &str) -> ProposedDate {
    ProposedDate::new(
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        time_slot.parse().unwrap(),
    )
}

pub fn test_config() -> CoreConfig {
    CoreConfig {
        retry_backoff: Duration::from_millis(1),
        ..CoreConfig::default()
    }
}

pub struct Harness {
    pub service: Arc<PickupService>,
    pub store: Arc<SqliteStore>,
    pub ledger: Arc<MemoryLedger>,
    pub events: Arc<MemoryEventBus>,
    pub clock: Arc<ManualClock>,
    pub donor: Caller,
    pub receiver: Caller,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: CoreConfig) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let ledger = Arc::new(MemoryLedger::new());
        let events = Arc::new(MemoryEventBus::new());
        let clock = Arc::new(ManualClock::new(start()));

        let service = Arc::new(PickupService::new(
            store.clone() as Arc<dyn Store>,
            ledger.clone(),
            events.clone() as Arc<dyn EventBus>,
            clock.clone(),
            config,
        ));

        Self {
            service,
            store,
            ledger,
            events,
            clock,
            donor: Caller::new(UserRef(Uuid::new_v4()), CallerRole::Donor),
            receiver: Caller::new(UserRef(Uuid::new_v4()), CallerRole::Ngo),
        }
    }

    pub fn params(&self) -> CreatePickupParams {
        CreatePickupParams {
            donor_ref: self.donor.user,
            receiver_ref: self.receiver.user,
            receiver_kind: ReceiverKind::Ngo,
            waste_type: "food".to_string(),
            item_name: "bread loaves".to_string(),
            quantity: 5.0,
            description: None,
        }
    }

    pub async fn pending(&self) -> PickupView {
        self.service.create_pickup(&self.params()).await.unwrap()
    }

    /// A pickup confirmed for 2025-01-11 2:00 PM.
    pub async fn scheduled(&self) -> PickupView {
        let pickup = self.pending().await;
        self.service
            .propose_dates(
                &pickup.id,
                &self.receiver,
                vec![slot("2025-01-10", "10:00 AM"), slot("2025-01-11", "2:00 PM")],
            )
            .await
            .unwrap();
        self.service
            .confirm_date(&pickup.id, &self.donor, slot("2025-01-11", "2:00 PM"))
            .await
            .unwrap()
    }

    /// A pickup whose token has been presented, plus nothing else outstanding.
    pub async fn accepted(&self) -> PickupView {
        let pickup = self.scheduled().await;
        let issued = self
            .service
            .request_token(&pickup.id, &self.receiver)
            .await
            .unwrap();
        self.service
            .present_token(&pickup.id, &self.donor, &issued.secret)
            .await
            .unwrap()
    }
}
