//! SQLite backend for handover storage.
//!
//! Pickups live in one row each; the embedded token history, proposed dates and queued
//! points credit are JSON columns. Writes are a compare-and-swap on the `version` column,
//! so concurrent writers to one pickup never both succeed from the same snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handover_ledger::{CreditAck, CreditRequest, LedgerError, PointsLedger};
use handover_storage::{
    CreatePickupParams, Pickup, PickupId, PickupStatus, ReceiverKind, Store, StoreError, UserRef,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const PICKUP_COLUMNS: &str = "id, donor_ref, receiver_ref, receiver_kind, waste_type, item_name, \
     quantity, description, status, proposed_dates, confirmed_date, tokens, completed_at, \
     completion_notes, additional_points, points_credit, version, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        // A single connection that never recycles: each in-memory connection is its own
        // database.
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(backend)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(backend)?;
        Self::migrate(pool).await
    }

    /// Open (creating if missing) a database file, e.g. `sqlite://handover.db`.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, StoreError> {
        MIGRATOR.run(&pool).await.map_err(backend)?;
        Ok(Self { pool })
    }

    /// Sum of points credited to a recipient.
    pub async fn points_balance(&self, recipient: &UserRef) -> Result<i64, StoreError> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(base_points + bonus_points), 0) FROM point_credits
             WHERE recipient_ref = ?",
        )
        .bind(recipient.0.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(total)
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {}", ms)))
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(backend)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(backend)
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_str(s).map_err(backend)
}

fn pickup_from_row(row: &SqliteRow) -> Result<Pickup, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let donor_ref: String = row.try_get("donor_ref").map_err(backend)?;
    let receiver_ref: String = row.try_get("receiver_ref").map_err(backend)?;
    let receiver_kind: String = row.try_get("receiver_kind").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    let proposed_dates: String = row.try_get("proposed_dates").map_err(backend)?;
    let confirmed_date: Option<String> = row.try_get("confirmed_date").map_err(backend)?;
    let tokens: String = row.try_get("tokens").map_err(backend)?;
    let completed_at: Option<i64> = row.try_get("completed_at").map_err(backend)?;
    let additional_points: Option<i64> = row.try_get("additional_points").map_err(backend)?;
    let points_credit: Option<String> = row.try_get("points_credit").map_err(backend)?;
    let created_at: i64 = row.try_get("created_at").map_err(backend)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(backend)?;

    Ok(Pickup {
        id: PickupId(parse_uuid(&id)?),
        donor_ref: UserRef(parse_uuid(&donor_ref)?),
        receiver_ref: UserRef(parse_uuid(&receiver_ref)?),
        receiver_kind: ReceiverKind::from_str(&receiver_kind).map_err(backend)?,
        waste_type: row.try_get("waste_type").map_err(backend)?,
        item_name: row.try_get("item_name").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        status: PickupStatus::from_str(&status).map_err(StoreError::Backend)?,
        proposed_dates: from_json(&proposed_dates)?,
        confirmed_date: confirmed_date.as_deref().map(from_json).transpose()?,
        tokens: from_json(&tokens)?,
        completed_at: completed_at.map(from_millis).transpose()?,
        completion_notes: row.try_get("completion_notes").map_err(backend)?,
        additional_points: additional_points
            .map(|p| u32::try_from(p).map_err(backend))
            .transpose()?,
        points_credit: points_credit.as_deref().map(from_json).transpose()?,
        version: row.try_get("version").map_err(backend)?,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Pickups ─────────────────────────────

    async fn create_pickup(&self, params: &CreatePickupParams) -> Result<Pickup, StoreError> {
        let id = PickupId::new();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO pickups(id, donor_ref, receiver_ref, receiver_kind, waste_type, item_name,
                                 quantity, description, status, created_at, updated_at)
             VALUES(?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(id.0.to_string())
        .bind(params.donor_ref.0.to_string())
        .bind(params.receiver_ref.0.to_string())
        .bind(params.receiver_kind.as_str())
        .bind(&params.waste_type)
        .bind(&params.item_name)
        .bind(params.quantity)
        .bind(&params.description)
        .bind(PickupStatus::Pending.as_str())
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let s = e.to_string();
            if s.contains("UNIQUE") {
                StoreError::AlreadyExists
            } else {
                StoreError::Backend(s)
            }
        })?;

        // Read back so callers see exactly what was persisted (timestamps at ms precision).
        self.get_pickup(&id).await
    }

    async fn get_pickup(&self, pickup_id: &PickupId) -> Result<Pickup, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM pickups WHERE id = ?", PICKUP_COLUMNS))
            .bind(pickup_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;

        pickup_from_row(&row)
    }

    async fn list_pickups_for_party(&self, party: &UserRef) -> Result<Vec<Pickup>, StoreError> {
        let party = party.0.to_string();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pickups WHERE donor_ref = ? OR receiver_ref = ?
             ORDER BY created_at DESC, id DESC",
            PICKUP_COLUMNS
        ))
        .bind(&party)
        .bind(&party)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(pickup_from_row).collect()
    }

    async fn list_pickups_by_status(
        &self,
        status: PickupStatus,
    ) -> Result<Vec<Pickup>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pickups WHERE status = ? ORDER BY created_at, id",
            PICKUP_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(pickup_from_row).collect()
    }

    async fn update_pickup(&self, pickup: &Pickup) -> Result<Pickup, StoreError> {
        let now = Utc::now();
        let confirmed_date = pickup.confirmed_date.as_ref().map(to_json).transpose()?;
        let points_credit = pickup.points_credit.as_ref().map(to_json).transpose()?;

        let result = sqlx::query(
            "UPDATE pickups
             SET status = ?, proposed_dates = ?, confirmed_date = ?, tokens = ?,
                 completed_at = ?, completion_notes = ?, additional_points = ?,
                 points_credit = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(pickup.status.as_str())
        .bind(to_json(&pickup.proposed_dates)?)
        .bind(confirmed_date)
        .bind(to_json(&pickup.tokens)?)
        .bind(pickup.completed_at.map(to_millis))
        .bind(&pickup.completion_notes)
        .bind(pickup.additional_points.map(i64::from))
        .bind(points_credit)
        .bind(to_millis(now))
        .bind(pickup.id.0.to_string())
        .bind(pickup.version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM pickups WHERE id = ?")
                .bind(pickup.id.0.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

            return match exists {
                None => Err(StoreError::NotFound),
                Some((current,)) => {
                    tracing::debug!(
                        pickup_id = %pickup.id,
                        expected = pickup.version,
                        current,
                        "stale pickup version"
                    );
                    Err(StoreError::Conflict)
                }
            };
        }

        let mut stored = pickup.clone();
        stored.version = pickup.version + 1;
        stored.updated_at = from_millis(to_millis(now))?;
        Ok(stored)
    }

    async fn delete_pickup(&self, pickup_id: &PickupId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM pickups WHERE id = ?")
            .bind(pickup_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PointsLedger for SqliteStore {
    async fn credit_once(&self, request: &CreditRequest) -> Result<CreditAck, LedgerError> {
        let ledger_err = |e: sqlx::Error| LedgerError::Backend(e.to_string());
        let transaction_id = Uuid::now_v7();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO point_credits(pickup_id, transaction_id, recipient_ref, base_points,
                                       bonus_points, credited_at)
             VALUES(?,?,?,?,?,?)
             ON CONFLICT(pickup_id) DO NOTHING",
        )
        .bind(request.pickup_id.0.to_string())
        .bind(transaction_id.to_string())
        .bind(request.recipient.0.to_string())
        .bind(i64::from(request.base_points))
        .bind(i64::from(request.bonus_points))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        if result.rows_affected() == 1 {
            return Ok(CreditAck {
                transaction_id,
                credited_at: DateTime::from_timestamp_millis(to_millis(now)).unwrap_or(now),
                duplicate: false,
            });
        }

        let (existing_id, credited_at): (String, i64) = sqlx::query_as(
            "SELECT transaction_id, credited_at FROM point_credits WHERE pickup_id = ?",
        )
        .bind(request.pickup_id.0.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(ledger_err)?;

        tracing::debug!(pickup_id = %request.pickup_id, "duplicate credit ignored");

        Ok(CreditAck {
            transaction_id: Uuid::try_parse(&existing_id)
                .map_err(|e| LedgerError::Backend(e.to_string()))?,
            credited_at: DateTime::from_timestamp_millis(credited_at)
                .ok_or_else(|| LedgerError::Backend("credited_at out of range".to_string()))?,
            duplicate: true,
        })
    }
}
