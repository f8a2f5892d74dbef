use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Row identity used for in-process serialization of writers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Appointment(i64),
    Slot {
        doctor_id: i64,
        scheduled_at: NaiveDateTime,
    },
    Reminder(i64),
}

impl LockKey {
    pub fn slot(doctor_id: i64, scheduled_at: NaiveDateTime) -> Self {
        LockKey::Slot {
            doctor_id,
            scheduled_at,
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Appointment(id) => write!(f, "appointment:{}", id),
            LockKey::Slot {
                doctor_id,
                scheduled_at,
            } => write!(f, "slot:{}:{}", doctor_id, scheduled_at.format("%Y-%m-%dT%H:%M")),
            LockKey::Reminder(id) => write!(f, "reminder:{}", id),
        }
    }
}

/// Keyed lock table: writers on the same row wait for each other, writers on
/// different rows never do.
#[derive(Debug, Default)]
pub struct RowLocks {
    table: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

/// Holds every lock of one operation until dropped.
#[derive(Debug)]
pub struct RowGuard {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl RowGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: LockKey) -> RowGuard {
        self.acquire_all(vec![key]).await
    }

    /// Locks are taken in key order, so two operations sharing rows cannot deadlock.
    pub async fn acquire_all(&self, mut keys: Vec<LockKey>) -> RowGuard {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let row = self.row(key);
            guards.push(row.lock_owned().await);
            debug!("Row lock acquired: {}", key);
        }

        RowGuard {
            keys,
            _guards: guards,
        }
    }

    /// Rows currently held or awaited.
    pub fn tracked_rows(&self) -> usize {
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        table.retain(|_, row| Arc::strong_count(row) > 1);
        table.len()
    }

    fn row(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries only referenced by the table are idle.
        table.retain(|_, row| Arc::strong_count(row) > 1);
        Arc::clone(table.entry(key.clone()).or_default())
    }
}
