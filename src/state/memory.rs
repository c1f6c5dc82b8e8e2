use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::error::StoreError;
use super::store::{RecordWrite, StateStore};
use super::{Scope, ScopeType, StateRecord};

type RowKey = (ScopeType, String, String, String);

#[derive(Debug, Clone)]
struct Row {
    json: String,
    expires_at: Option<DateTime<Utc>>,
    version: i64,
}

/// Process-local state store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    rows: DashMap<RowKey, Row>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn row_key(scope: &Scope, namespace: &str, key: &str) -> RowKey {
    (
        scope.scope_type,
        scope.id.clone(),
        namespace.to_string(),
        key.to_string(),
    )
}

fn to_record(key: &RowKey, row: &Row) -> StateRecord {
    StateRecord {
        scope: Scope {
            scope_type: key.0,
            id: key.1.clone(),
        },
        namespace: key.2.clone(),
        key: key.3.clone(),
        json: row.json.clone(),
        expires_at: row.expires_at,
        version: row.version,
    }
}

impl StateStore for MemoryStateStore {
    fn get_record(
        &self,
        scope: &Scope,
        namespace: &str,
        key: &str,
    ) -> Result<Option<StateRecord>, StoreError> {
        let key = row_key(scope, namespace, key);
        Ok(self.rows.get(&key).map(|row| to_record(&key, &row)))
    }

    fn namespace_records(
        &self,
        scope: &Scope,
        namespace: &str,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let mut records: Vec<StateRecord> = self
            .rows
            .iter()
            .filter(|entry| {
                let (scope_type, id, ns, _) = entry.key();
                *scope_type == scope.scope_type && *id == scope.id && ns == namespace
            })
            .map(|entry| to_record(entry.key(), entry.value()))
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn update(&self, write: &RecordWrite<'_>) -> Result<bool, StoreError> {
        let key = row_key(write.scope, write.namespace, write.key);
        match self.rows.get_mut(&key) {
            Some(mut row) => {
                row.json = write.json.to_string();
                row.expires_at = write.expires_at;
                row.version += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert(&self, write: &RecordWrite<'_>) -> Result<(), StoreError> {
        let key = row_key(write.scope, write.namespace, write.key);
        match self.rows.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(Row {
                    json: write.json.to_string(),
                    expires_at: write.expires_at,
                    version: 1,
                });
                Ok(())
            }
        }
    }

    fn delete(&self, scope: &Scope, namespace: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.rows.remove(&row_key(scope, namespace, key)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_insert_rejects_duplicate() {
        let store = MemoryStateStore::new();
        let scope = Scope::global();
        let write = RecordWrite {
            scope: &scope,
            namespace: "prefs",
            key: "lang",
            json: "\"en_us\"",
            expires_at: None,
        };

        store.insert(&write).unwrap();
        assert!(matches!(store.insert(&write), Err(StoreError::Duplicate)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_namespace_values_skip_expired() {
        let store = MemoryStateStore::new();
        let scope = Scope::global();
        let now = Utc::now();
        for (key, expires_at) in [("b", None), ("a", Some(now - Duration::seconds(1)))] {
            store
                .insert(&RecordWrite {
                    scope: &scope,
                    namespace: "prefs",
                    key,
                    json: "1",
                    expires_at,
                })
                .unwrap();
        }

        assert_eq!(store.namespace_records(&scope, "prefs").unwrap().len(), 2);
        let live = store.namespace_values(&scope, "prefs", now).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].key, "b");
        assert!(store.delete(&scope, "prefs", "a").unwrap());
        assert!(!store.delete(&scope, "prefs", "a").unwrap());
    }
}
