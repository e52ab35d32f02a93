use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use shared::shared_spin_wheel::{
    project_segments, CatalogItem, Segment, SpinRecordView, SpinStatus, WheelState,
};

use crate::error::SpinError;

pub mod postgres;

#[cfg(test)]
pub mod memory;

/// The singleton wheel session. One row, one wheel, system-wide.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub status: SpinStatus,
    pub owner_id: Option<Uuid>,
    pub owner_name: Option<String>,
    pub wager: Option<i64>,
    pub segments: Vec<Segment>,
    pub result_index: Option<usize>,
    pub started_at: Option<OffsetDateTime>,
    pub duration_ms: Option<i64>,
    /// Set exactly once, at settlement. Distinct from `status` so a settled
    /// spin stays provably settled even while the status keeps moving.
    pub settled_at: Option<OffsetDateTime>,
}

impl SessionRecord {
    pub fn idle() -> Self {
        Self {
            status: SpinStatus::Idle,
            owner_id: None,
            owner_name: None,
            wager: None,
            segments: Vec::new(),
            result_index: None,
            started_at: None,
            duration_ms: None,
            settled_at: None,
        }
    }

    /// Display-safe view. The drawn index stays hidden until the spin has
    /// settled; a settled session without one is a broken invariant, not a
    /// state to paper over.
    pub fn projection(&self) -> Result<WheelState, SpinError> {
        let result_index = match self.status {
            SpinStatus::Result => Some(
                self.result_index
                    .ok_or(SpinError::Corrupt("settled session without a result index"))?,
            ),
            _ => None,
        };

        Ok(WheelState {
            status: self.status,
            owner_name: self.owner_name.clone(),
            wager: self.wager,
            segments: project_segments(&self.segments),
            result_index,
            started_at_ms: self.started_at.map(unix_ms),
            duration_ms: self.duration_ms,
        })
    }
}

pub fn unix_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Everything `begin_spin` persists. The outcome is drawn before the claim,
/// so a successful claim is also a committed result.
#[derive(Debug, Clone)]
pub struct NewSpin {
    pub owner_id: Uuid,
    pub owner_name: String,
    pub wager: i64,
    pub segments: Vec<Segment>,
    pub result_index: usize,
    pub started_at: OffsetDateTime,
    pub duration_ms: i64,
}

/// The financial consequence of one settled spin.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub user_id: Uuid,
    pub username: String,
    pub wager: i64,
    /// Coins credited back: the bonus amount, the refunded wager for a
    /// respin, or zero for an item win.
    pub payout: i64,
    pub prize: String,
    pub settled_at: OffsetDateTime,
}

/// Storage seam for the spin engine. Every method is one atomic unit of
/// work; the Postgres implementation maps each to a single transaction of
/// conditional updates, so the trait stays correct even if the singleton
/// session guarantee is ever relaxed.
#[async_trait]
pub trait WheelStore: Send + Sync {
    /// Active prize items across all tiers; the admin catalog owns writes.
    async fn list_active_items(&self) -> Result<Vec<CatalogItem>, SpinError>;

    async fn load_session(&self) -> Result<SessionRecord, SpinError>;

    /// Claim the idle session and debit the wager, atomically. Fails with
    /// `SessionBusy` when the wheel is not idle and `InsufficientFunds`
    /// when the conditional debit matches no row; neither failure leaves a
    /// partial write behind.
    async fn begin_spin(&self, spin: NewSpin) -> Result<SessionRecord, SpinError>;

    /// Flip spinning to result, credit the payout and append the spin
    /// record in one unit of work. `started_at` pins the exact spin the
    /// settlement was computed against, so a stale settlement cannot land
    /// on a successor spin. Guarded so it can succeed at most once per
    /// spin; returns `None` when the pinned spin is gone or already
    /// settled.
    async fn settle_spin(
        &self,
        started_at: OffsetDateTime,
        settlement: Settlement,
    ) -> Result<Option<SessionRecord>, SpinError>;

    /// Clear the session back to idle. `started_at` pins the exact spin the
    /// caller authorized against; returns false when that spin is already
    /// gone.
    async fn release_session(&self, started_at: OffsetDateTime) -> Result<bool, SpinError>;

    async fn balance(&self, user_id: Uuid) -> Result<i64, SpinError>;

    async fn recent_records(&self, limit: i64) -> Result<Vec<SpinRecordView>, SpinError>;
}
