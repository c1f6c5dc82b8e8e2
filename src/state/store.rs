use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::error::{StateError, StoreError};
use super::{Scope, StateRecord};

/// Attempts the upsert loop makes before reporting a conflict.
pub const UPSERT_ATTEMPTS: u32 = 5;

/// One write addressed at a (scope, namespace, key) row.
#[derive(Debug, Clone, Copy)]
pub struct RecordWrite<'a> {
    pub scope: &'a Scope,
    pub namespace: &'a str,
    pub key: &'a str,
    pub json: &'a str,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Storage backend for scoped state. Backends only provide plain update,
/// insert and delete; the upsert is built on top of them so it works the
/// same way everywhere.
pub trait StateStore: Send + Sync {
    /// The stored row, expired or not.
    fn get_record(
        &self,
        scope: &Scope,
        namespace: &str,
        key: &str,
    ) -> Result<Option<StateRecord>, StoreError>;

    /// Every row in `namespace` at `scope`, ordered by key. Includes expired rows.
    fn namespace_records(&self, scope: &Scope, namespace: &str)
        -> Result<Vec<StateRecord>, StoreError>;

    /// Overwrite an existing row and bump its version. `false` if no row matched.
    fn update(&self, write: &RecordWrite<'_>) -> Result<bool, StoreError>;

    /// Create a row at version 1. `StoreError::Duplicate` if it already exists.
    fn insert(&self, write: &RecordWrite<'_>) -> Result<(), StoreError>;

    fn delete(&self, scope: &Scope, namespace: &str, key: &str) -> Result<bool, StoreError>;

    /// The row if present and not expired at `now`.
    fn get(
        &self,
        scope: &Scope,
        namespace: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StateRecord>, StoreError> {
        Ok(self
            .get_record(scope, namespace, key)?
            .filter(|record| !record.is_expired(now)))
    }

    /// Live rows in `namespace` at `scope`.
    fn namespace_values(
        &self,
        scope: &Scope,
        namespace: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let mut records = self.namespace_records(scope, namespace)?;
        records.retain(|record| !record.is_expired(now));
        Ok(records)
    }

    /// Update, else insert, else (a concurrent writer inserted first) update
    /// again. Gives up with `StateError::Conflict` after `UPSERT_ATTEMPTS`.
    fn upsert(&self, write: &RecordWrite<'_>) -> Result<(), StateError> {
        for attempt in 1..=UPSERT_ATTEMPTS {
            if self.update(write)? {
                return Ok(());
            }
            match self.insert(write) {
                Ok(()) => return Ok(()),
                Err(StoreError::Duplicate) => {
                    debug!(
                        "Insert race on {} {}.{} (attempt {})",
                        write.scope, write.namespace, write.key, attempt
                    );
                    if attempt < UPSERT_ATTEMPTS {
                        thread::sleep(Duration::from_millis(u64::from(attempt)));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StateError::Conflict {
            key: format!("{} {}.{}", write.scope, write.namespace, write.key),
            attempts: UPSERT_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Simulates a writer that always sneaks in between our update and insert
    /// the first `races` times.
    struct RacingStore {
        inner: MemoryStateStore,
        races: AtomicU32,
        updates: AtomicU32,
    }

    impl RacingStore {
        fn new(races: u32) -> Self {
            Self {
                inner: MemoryStateStore::new(),
                races: AtomicU32::new(races),
                updates: AtomicU32::new(0),
            }
        }
    }

    impl StateStore for RacingStore {
        fn get_record(
            &self,
            scope: &Scope,
            ns: &str,
            key: &str,
        ) -> Result<Option<StateRecord>, StoreError> {
            self.inner.get_record(scope, ns, key)
        }

        fn namespace_records(
            &self,
            scope: &Scope,
            ns: &str,
        ) -> Result<Vec<StateRecord>, StoreError> {
            self.inner.namespace_records(scope, ns)
        }

        fn update(&self, write: &RecordWrite<'_>) -> Result<bool, StoreError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.inner.update(write)
        }

        fn insert(&self, write: &RecordWrite<'_>) -> Result<(), StoreError> {
            let remaining = self.races.load(Ordering::SeqCst);
            if remaining > 0 {
                self.races.store(remaining - 1, Ordering::SeqCst);
                // The rival row is gone again before we look, so the next update misses too.
                return Err(StoreError::Duplicate);
            }
            self.inner.insert(write)
        }

        fn delete(&self, scope: &Scope, ns: &str, key: &str) -> Result<bool, StoreError> {
            self.inner.delete(scope, ns, key)
        }
    }

    fn write<'a>(scope: &'a Scope, json: &'a str) -> RecordWrite<'a> {
        RecordWrite {
            scope,
            namespace: "prefs",
            key: "lang",
            json,
            expires_at: None,
        }
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let store = MemoryStateStore::new();
        let scope = Scope::global();

        store.upsert(&write(&scope, "\"en_us\"")).unwrap();
        store.upsert(&write(&scope, "\"zh_cn\"")).unwrap();

        let record = store.get_record(&scope, "prefs", "lang").unwrap().unwrap();
        assert_eq!(record.json, "\"zh_cn\"");
        assert_eq!(record.version, 2);
    }

    #[test]
    fn test_upsert_retries_after_lost_race() {
        let store = RacingStore::new(2);
        let scope = Scope::global();

        store.upsert(&write(&scope, "1")).unwrap();

        assert_eq!(store.updates.load(Ordering::SeqCst), 3);
        let record = store.get_record(&scope, "prefs", "lang").unwrap().unwrap();
        assert_eq!(record.json, "1");
    }

    #[test]
    fn test_upsert_gives_up_with_conflict() {
        let store = RacingStore::new(u32::MAX);
        let scope = Scope::global();

        let err = store.upsert(&write(&scope, "1")).unwrap_err();
        assert!(matches!(err, StateError::Conflict { attempts: UPSERT_ATTEMPTS, .. }));
    }

    #[test]
    fn test_concurrent_writers_leave_one_value() {
        let store = Arc::new(MemoryStateStore::new());
        let scope = Scope::global();
        let values: Vec<String> = (0..16).map(|i| i.to_string()).collect();

        thread::scope(|s| {
            for value in &values {
                let store = Arc::clone(&store);
                let scope = &scope;
                s.spawn(move || store.upsert(&write(scope, value)).unwrap());
            }
        });

        let record = store.get_record(&scope, "prefs", "lang").unwrap().unwrap();
        assert!(values.contains(&record.json));
        assert_eq!(record.version, values.len() as i64);
    }
}
