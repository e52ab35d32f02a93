use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use async_trait::async_trait;
use shared::shared_spin_wheel::{CatalogItem, Segment, SpinRecordView, SpinStatus};

use super::{unix_ms, NewSpin, SessionRecord, Settlement, WheelStore};
use crate::error::SpinError;

/// Fixed primary key of the one wheel session row. A future multi-wheel
/// deployment would turn this into a sharding key and keep the same
/// conditional-transition discipline per row.
pub const WHEEL_SESSION_ID: Uuid = Uuid::from_u128(0x0057_4845_454c_0000_0000_0000_0000_0001);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn session_from_row(row: &PgRow) -> Result<SessionRecord, SpinError> {
        let status_raw: String = row.try_get("status")?;
        let status = SpinStatus::parse(&status_raw)
            .ok_or(SpinError::Corrupt("unknown session status in storage"))?;

        let segments: Option<Json<Vec<Segment>>> = row.try_get("segments")?;
        let result_index: Option<i32> = row.try_get("result_index")?;

        Ok(SessionRecord {
            status,
            owner_id: row.try_get("owner_id")?,
            owner_name: row.try_get("owner_name")?,
            wager: row.try_get("wager")?,
            segments: segments.map(|j| j.0).unwrap_or_default(),
            result_index: result_index.map(|i| i as usize),
            started_at: row.try_get("started_at")?,
            duration_ms: row.try_get("duration_ms")?,
            settled_at: row.try_get("settled_at")?,
        })
    }
}

#[async_trait]
impl WheelStore for PgStore {
    async fn list_active_items(&self) -> Result<Vec<CatalogItem>, SpinError> {
        let rows = sqlx::query(
            "SELECT id, name, tier, image_ref FROM prize_items WHERE active = TRUE ORDER BY tier, name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CatalogItem {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    tier: row.try_get("tier")?,
                    image_ref: row.try_get("image_ref")?,
                })
            })
            .collect()
    }

    async fn load_session(&self) -> Result<SessionRecord, SpinError> {
        let row = sqlx::query(
            "SELECT status, owner_id, owner_name, wager, segments, result_index,
                    started_at, duration_ms, settled_at
             FROM wheel_sessions WHERE id = $1",
        )
        .bind(WHEEL_SESSION_ID)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SpinError::Corrupt("wheel session row is missing"))?;

        Self::session_from_row(&row)
    }

    async fn begin_spin(&self, spin: NewSpin) -> Result<SessionRecord, SpinError> {
        let mut tx = self.pool.begin().await?;

        // Claim the wheel: only an idle session can be taken, and only one
        // concurrent caller can match this row.
        let claimed = sqlx::query(
            "UPDATE wheel_sessions
             SET status = 'spinning', owner_id = $2, owner_name = $3, wager = $4,
                 segments = $5, result_index = $6, started_at = $7, duration_ms = $8,
                 settled_at = NULL
             WHERE id = $1 AND status = 'idle'",
        )
        .bind(WHEEL_SESSION_ID)
        .bind(spin.owner_id)
        .bind(&spin.owner_name)
        .bind(spin.wager)
        .bind(Json(&spin.segments))
        .bind(spin.result_index as i32)
        .bind(spin.started_at)
        .bind(spin.duration_ms)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Err(SpinError::SessionBusy);
        }

        // Decrement-if-sufficient, never read-then-write.
        let debited = sqlx::query(
            "UPDATE users SET currency_balance = currency_balance - $2
             WHERE id = $1 AND currency_balance >= $2",
        )
        .bind(spin.owner_id)
        .bind(spin.wager)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let balance: i64 = sqlx::query_scalar("SELECT currency_balance FROM users WHERE id = $1")
                .bind(spin.owner_id)
                .fetch_optional(&mut *tx)
                .await?
                .unwrap_or(0);
            // Dropping the transaction rolls the session claim back.
            return Err(SpinError::InsufficientFunds {
                balance,
                wager: spin.wager,
            });
        }

        tx.commit().await?;

        Ok(SessionRecord {
            status: SpinStatus::Spinning,
            owner_id: Some(spin.owner_id),
            owner_name: Some(spin.owner_name),
            wager: Some(spin.wager),
            segments: spin.segments,
            result_index: Some(spin.result_index),
            started_at: Some(spin.started_at),
            duration_ms: Some(spin.duration_ms),
            settled_at: None,
        })
    }

    async fn settle_spin(
        &self,
        started_at: OffsetDateTime,
        settlement: Settlement,
    ) -> Result<Option<SessionRecord>, SpinError> {
        let mut tx = self.pool.begin().await?;

        // The transition is the idempotence guard: it can match at most one
        // spin, exactly once. Pinning started_at keeps a settlement computed
        // against an evicted session from landing on its successor.
        let flipped = sqlx::query(
            "UPDATE wheel_sessions SET status = 'result', settled_at = $2
             WHERE id = $1 AND status = 'spinning' AND settled_at IS NULL
               AND started_at = $3",
        )
        .bind(WHEEL_SESSION_ID)
        .bind(settlement.settled_at)
        .bind(started_at)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            return Ok(None);
        }

        if settlement.payout > 0 {
            sqlx::query("UPDATE users SET currency_balance = currency_balance + $2 WHERE id = $1")
                .bind(settlement.user_id)
                .bind(settlement.payout)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO spin_records (id, user_id, username, wager, prize, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(settlement.user_id)
        .bind(&settlement.username)
        .bind(settlement.wager)
        .bind(&settlement.prize)
        .bind(settlement.settled_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(self.load_session().await?))
    }

    async fn release_session(&self, started_at: OffsetDateTime) -> Result<bool, SpinError> {
        let cleared = sqlx::query(
            "UPDATE wheel_sessions
             SET status = 'idle', owner_id = NULL, owner_name = NULL, wager = NULL,
                 segments = NULL, result_index = NULL, started_at = NULL,
                 duration_ms = NULL, settled_at = NULL
             WHERE id = $1 AND status <> 'idle' AND started_at = $2",
        )
        .bind(WHEEL_SESSION_ID)
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(cleared.rows_affected() == 1)
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64, SpinError> {
        let balance: Option<i64> = sqlx::query_scalar("SELECT currency_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(balance.unwrap_or(0))
    }

    async fn recent_records(&self, limit: i64) -> Result<Vec<SpinRecordView>, SpinError> {
        let rows = sqlx::query(
            "SELECT username, wager, prize, created_at
             FROM spin_records ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let created_at: OffsetDateTime = row.try_get("created_at")?;
                Ok(SpinRecordView {
                    username: row.try_get("username")?,
                    wager: row.try_get("wager")?,
                    prize: row.try_get("prize")?,
                    created_at_ms: unix_ms(created_at),
                })
            })
            .collect()
    }
}
