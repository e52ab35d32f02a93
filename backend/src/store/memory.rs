use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use shared::shared_spin_wheel::{CatalogItem, SpinRecordView, SpinStatus};

use super::{unix_ms, NewSpin, SessionRecord, Settlement, WheelStore};
use crate::error::SpinError;

/// In-memory `WheelStore` with the same transition guarantees as the
/// Postgres store. Each trait method takes the lock once, so it is one
/// atomic unit of work just like a database transaction.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    session: SessionRecord,
    items: Vec<CatalogItem>,
    balances: HashMap<Uuid, i64>,
    records: Vec<SpinRecordView>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                session: SessionRecord::idle(),
                items: Vec::new(),
                balances: HashMap::new(),
                records: Vec::new(),
            }),
        }
    }

    pub fn seed_item(&self, item: CatalogItem) {
        self.inner.lock().unwrap().items.push(item);
    }

    pub fn seed_balance(&self, user_id: Uuid, balance: i64) {
        self.inner.lock().unwrap().balances.insert(user_id, balance);
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }
}

#[async_trait]
impl WheelStore for MemoryStore {
    async fn list_active_items(&self) -> Result<Vec<CatalogItem>, SpinError> {
        Ok(self.inner.lock().unwrap().items.clone())
    }

    async fn load_session(&self) -> Result<SessionRecord, SpinError> {
        Ok(self.inner.lock().unwrap().session.clone())
    }

    async fn begin_spin(&self, spin: NewSpin) -> Result<SessionRecord, SpinError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.session.status != SpinStatus::Idle {
            return Err(SpinError::SessionBusy);
        }

        let balance = inner.balances.get(&spin.owner_id).copied().unwrap_or(0);
        if balance < spin.wager {
            return Err(SpinError::InsufficientFunds {
                balance,
                wager: spin.wager,
            });
        }
        inner.balances.insert(spin.owner_id, balance - spin.wager);

        inner.session = SessionRecord {
            status: SpinStatus::Spinning,
            owner_id: Some(spin.owner_id),
            owner_name: Some(spin.owner_name),
            wager: Some(spin.wager),
            segments: spin.segments,
            result_index: Some(spin.result_index),
            started_at: Some(spin.started_at),
            duration_ms: Some(spin.duration_ms),
            settled_at: None,
        };

        Ok(inner.session.clone())
    }

    async fn settle_spin(
        &self,
        started_at: OffsetDateTime,
        settlement: Settlement,
    ) -> Result<Option<SessionRecord>, SpinError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.session.status != SpinStatus::Spinning
            || inner.session.settled_at.is_some()
            || inner.session.started_at != Some(started_at)
        {
            return Ok(None);
        }

        inner.session.status = SpinStatus::Result;
        inner.session.settled_at = Some(settlement.settled_at);

        if settlement.payout > 0 {
            *inner.balances.entry(settlement.user_id).or_insert(0) += settlement.payout;
        }

        inner.records.push(SpinRecordView {
            username: settlement.username,
            wager: settlement.wager,
            prize: settlement.prize,
            created_at_ms: unix_ms(settlement.settled_at),
        });

        Ok(Some(inner.session.clone()))
    }

    async fn release_session(&self, started_at: OffsetDateTime) -> Result<bool, SpinError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.session.status == SpinStatus::Idle || inner.session.started_at != Some(started_at) {
            return Ok(false);
        }

        inner.session = SessionRecord::idle();
        Ok(true)
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64, SpinError> {
        Ok(self.inner.lock().unwrap().balances.get(&user_id).copied().unwrap_or(0))
    }

    async fn recent_records(&self, limit: i64) -> Result<Vec<SpinRecordView>, SpinError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.iter().rev().take(limit as usize).cloned().collect())
    }
}
