//! Per-user quota accounting with two-phase reserve/commit.
//!
//! All arithmetic happens while holding the ledger lock, so `reserve` is an
//! atomic compare-and-increment: two concurrent uploads can never jointly
//! pass the check when their combined size would overrun the total.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::types::QuotaRecord;

pub struct QuotaLedger {
    default_total: u64,
    accounts: Mutex<HashMap<Uuid, QuotaRecord>>,
}

impl QuotaLedger {
    pub fn new(default_total: u64) -> Self {
        Self {
            default_total,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Provisionally consumes `bytes` against the user's limit. Must be paired
    /// with exactly one `commit` or `release`.
    pub async fn reserve(&self, user_id: Uuid, bytes: u64) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let record = accounts
            .entry(user_id)
            .or_insert_with(|| QuotaRecord::new(user_id, self.default_total));

        let available = record.available();
        if bytes > available {
            warn!(%user_id, bytes, available, "quota reserve rejected");
            return Err(EngineError::QuotaExceeded {
                requested: bytes,
                available,
            });
        }
        record.reserved_bytes += bytes;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Finalizes a reservation: the bytes become committed usage.
    pub async fn commit(&self, user_id: Uuid, bytes: u64) {
        let mut accounts = self.accounts.lock().await;
        if let Some(record) = accounts.get_mut(&user_id) {
            record.reserved_bytes = record.reserved_bytes.saturating_sub(bytes);
            record.used_bytes += bytes;
            record.updated_at = Utc::now();
        }
    }

    /// Rolls a reservation back without charging the user.
    pub async fn release(&self, user_id: Uuid, bytes: u64) {
        let mut accounts = self.accounts.lock().await;
        if let Some(record) = accounts.get_mut(&user_id) {
            record.reserved_bytes = record.reserved_bytes.saturating_sub(bytes);
            record.updated_at = Utc::now();
        }
    }

    /// Applies a permanent signed adjustment to committed usage. Negative
    /// deltas (hard delete) saturate at zero; positive deltas re-check the
    /// ceiling.
    pub async fn adjust_delta(&self, user_id: Uuid, delta: i64) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let record = accounts
            .entry(user_id)
            .or_insert_with(|| QuotaRecord::new(user_id, self.default_total));

        if delta >= 0 {
            let bytes = delta as u64;
            let available = record.available();
            if bytes > available {
                return Err(EngineError::QuotaExceeded {
                    requested: bytes,
                    available,
                });
            }
            record.used_bytes += bytes;
        } else {
            record.used_bytes = record.used_bytes.saturating_sub(delta.unsigned_abs());
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Committed usage and total for a user, creating the account lazily.
    pub async fn usage(&self, user_id: Uuid) -> (u64, u64) {
        let mut accounts = self.accounts.lock().await;
        let record = accounts
            .entry(user_id)
            .or_insert_with(|| QuotaRecord::new(user_id, self.default_total));
        (record.used_bytes, record.total_bytes)
    }

    /// Dump for snapshot persistence. In-flight reservations are dropped;
    /// they belong to operations that will never commit after a restart.
    pub async fn export(&self) -> Vec<QuotaRecord> {
        let accounts = self.accounts.lock().await;
        accounts
            .values()
            .map(|r| {
                let mut r = r.clone();
                r.reserved_bytes = 0;
                r
            })
            .collect()
    }

    pub async fn import(&self, records: Vec<QuotaRecord>) {
        let mut accounts = self.accounts.lock().await;
        *accounts = records.into_iter().map(|r| (r.user_id, r)).collect();
    }

    /// Administrative override of a user's ceiling.
    pub async fn set_total(&self, user_id: Uuid, total_bytes: u64) {
        let mut accounts = self.accounts.lock().await;
        let record = accounts
            .entry(user_id)
            .or_insert_with(|| QuotaRecord::new(user_id, self.default_total));
        record.total_bytes = total_bytes;
        record.updated_at = Utc::now();
    }
}
