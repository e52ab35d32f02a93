use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use time::OffsetDateTime;
use tracing::info;

use shared::shared_spin_wheel::{
    build_segments, pick_index, Prize, SpinRecordView, SpinStatus, Tier, WheelState,
    RELEASE_GRACE_MS, SPIN_DURATION_MS,
};

use crate::auth::AuthUser;
use crate::error::SpinError;
use crate::store::{NewSpin, SessionRecord, Settlement, WheelStore};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// The spin session state machine. All mutations go through the store's
/// conditional updates; this type owns policy (tier validation, expiry
/// math, authorization) and the draw itself.
pub struct SpinEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl<S: WheelStore> SpinEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_parts(store, StdRng::from_entropy(), Arc::new(SystemClock))
    }

    /// Seeded generator and explicit clock, for deterministic tests.
    pub fn with_parts(store: S, rng: StdRng, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn read(&self) -> Result<WheelState, SpinError> {
        self.store.load_session().await?.projection()
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<SpinRecordView>, SpinError> {
        self.store.recent_records(limit.clamp(1, 100)).await
    }

    /// Start a spin: validate the tier, build this spin's wheel from the
    /// current catalog, draw the outcome, then claim the session and debit
    /// the wager in one storage transaction. The outcome is committed the
    /// instant this returns Ok.
    pub async fn start(&self, caller: &AuthUser, wager: i64) -> Result<WheelState, SpinError> {
        let tier = Tier::from_wager(wager).ok_or(SpinError::InvalidWager(wager))?;

        let catalog = self.store.list_active_items().await?;

        let (segments, result_index) = {
            let mut rng = self.rng.lock().unwrap();
            let segments = build_segments(tier, &catalog, &mut *rng);
            if segments.is_empty() {
                return Err(SpinError::Corrupt("segment builder produced an empty wheel"));
            }
            let index = pick_index(&segments, &mut *rng);
            (segments, index)
        };

        let record = self
            .store
            .begin_spin(NewSpin {
                owner_id: caller.id,
                owner_name: caller.display_name.clone(),
                wager,
                segments,
                result_index,
                started_at: self.clock.now(),
                duration_ms: SPIN_DURATION_MS,
            })
            .await?;

        info!(
            "🎡 {} wagered {} coins on a {}-segment wheel",
            caller.display_name,
            wager,
            record.segments.len()
        );

        record.projection()
    }

    /// Settle the in-flight spin once its announced duration has elapsed.
    /// Idempotent: called early, twice, or while idle it returns the
    /// current projection and credits nothing.
    pub async fn settle(&self) -> Result<WheelState, SpinError> {
        let session = self.store.load_session().await?;

        if session.status != SpinStatus::Spinning {
            return session.projection();
        }

        let started_at = session
            .started_at
            .ok_or(SpinError::Corrupt("spinning session without a start time"))?;
        let duration_ms = session.duration_ms.unwrap_or(SPIN_DURATION_MS);

        let now = self.clock.now();
        if (now - started_at).whole_milliseconds() < duration_ms as i128 {
            return session.projection();
        }

        let settlement = settlement_for(&session, now)?;
        let payout = settlement.payout;
        let prize = settlement.prize.clone();

        match self.store.settle_spin(started_at, settlement).await? {
            Some(record) => {
                info!(
                    "🎡 spin settled: {} won {} (payout {} coins)",
                    record.owner_name.as_deref().unwrap_or("unknown"),
                    prize,
                    payout
                );
                record.projection()
            }
            // Another caller won the transition; their credit stands.
            None => self.store.load_session().await?.projection(),
        }
    }

    /// Hand the wheel back to everyone. Owners may always release their own
    /// finished or wedged spin; anyone may once the spin has expired past
    /// the grace window; privileged callers may at any time.
    pub async fn release(&self, caller: &AuthUser) -> Result<WheelState, SpinError> {
        let session = self.store.load_session().await?;

        if session.status == SpinStatus::Idle {
            return session.projection();
        }

        let started_at = session
            .started_at
            .ok_or(SpinError::Corrupt("active session without a start time"))?;
        let duration_ms = session.duration_ms.unwrap_or(SPIN_DURATION_MS);

        let elapsed_ms = (self.clock.now() - started_at).whole_milliseconds();
        let expired = elapsed_ms > (duration_ms + RELEASE_GRACE_MS) as i128;
        let is_owner = session.owner_id == Some(caller.id);

        if !is_owner && !expired && !caller.is_privileged {
            return Err(SpinError::Forbidden);
        }

        if self.store.release_session(started_at).await? {
            info!("🎡 wheel released by {}", caller.display_name);
            return self.store.load_session().await?.projection();
        }

        // Lost the conditional update. Someone releasing first is still a
        // released wheel; anything else needs the caller to retry.
        let session = self.store.load_session().await?;
        if session.status == SpinStatus::Idle {
            session.projection()
        } else {
            Err(SpinError::StorageConflict)
        }
    }

    /// Background pass: settle a due spin, then idle an expired session
    /// with system authority so an abandoned client cannot wedge the wheel.
    pub async fn sweep(&self) -> Result<(), SpinError> {
        self.settle().await?;

        let session = self.store.load_session().await?;
        if session.status != SpinStatus::Result {
            return Ok(());
        }

        if let (Some(started_at), Some(duration_ms)) = (session.started_at, session.duration_ms) {
            let elapsed_ms = (self.clock.now() - started_at).whole_milliseconds();
            if elapsed_ms > (duration_ms + RELEASE_GRACE_MS) as i128
                && self.store.release_session(started_at).await?
            {
                info!("🧹 expired wheel session returned to idle");
            }
        }

        Ok(())
    }
}

fn settlement_for(session: &SessionRecord, now: OffsetDateTime) -> Result<Settlement, SpinError> {
    let user_id = session
        .owner_id
        .ok_or(SpinError::Corrupt("spinning session without an owner"))?;
    let wager = session
        .wager
        .ok_or(SpinError::Corrupt("spinning session without a wager"))?;
    let index = session
        .result_index
        .ok_or(SpinError::Corrupt("spinning session without a drawn result"))?;
    let prize = session
        .segments
        .get(index)
        .ok_or(SpinError::Corrupt("result index out of segment range"))?
        .prize
        .clone();

    let payout = match &prize {
        Prize::Coins { amount } => *amount,
        Prize::Respin => wager,
        Prize::Item { .. } => 0,
    };

    Ok(Settlement {
        user_id,
        username: session.owner_name.clone().unwrap_or_default(),
        wager,
        payout,
        prize: prize.description(),
        settled_at: now,
    })
}
