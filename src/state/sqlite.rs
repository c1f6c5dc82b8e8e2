use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{info, warn};

use super::error::StoreError;
use super::store::{RecordWrite, StateStore};
use super::{Scope, ScopeType, StateRecord};

/// SQLite-backed state store.
///
/// One connection behind a mutex. Update and insert take the lock
/// separately, so two writers can still race between them; the upsert loop
/// in [`StateStore::upsert`] resolves that through the unique index.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open state database: {}", path.display()))?;

        // journal_mode PRAGMA returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Self::run_migrations(&conn)?;

        info!("State store initialized at: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS bot_state (
                scope_type TEXT NOT NULL,
                scope_id TEXT NOT NULL,
                namespace TEXT NOT NULL,
                k TEXT NOT NULL,
                v_json TEXT NOT NULL,
                expires_at INTEGER,
                version INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_bot_state_key
                ON bot_state(scope_type, scope_id, namespace, k);
            ",
        )
        .context("Failed to create bot_state table")?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn millis_to_instant(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

type RawRecord = (String, String, String, String, String, Option<i64>, i64);

fn read_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_record(
    (scope_type, scope_id, namespace, key, json, expires_at, version): (
        String,
        String,
        String,
        String,
        String,
        Option<i64>,
        i64,
    ),
) -> Option<StateRecord> {
    let scope_type = match scope_type.parse::<ScopeType>() {
        Ok(t) => t,
        Err(e) => {
            warn!("Skipping state row {}.{}: {}", namespace, key, e);
            return None;
        }
    };
    Some(StateRecord {
        scope: Scope {
            scope_type,
            id: scope_id,
        },
        namespace,
        key,
        json,
        expires_at: millis_to_instant(expires_at),
        version,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT scope_type, scope_id, namespace, k, v_json, expires_at, version FROM bot_state";

impl StateStore for SqliteStateStore {
    fn get_record(
        &self,
        scope: &Scope,
        namespace: &str,
        key: &str,
    ) -> Result<Option<StateRecord>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!(
                    "{} WHERE scope_type = ?1 AND scope_id = ?2 AND namespace = ?3 AND k = ?4",
                    SELECT_COLUMNS
                ),
                params![scope.scope_type.as_str(), &scope.id, namespace, key],
                read_record,
            )
            .optional()
            .map_err(|e| StoreError::backend("Failed to read state record", e))?;
        Ok(row.and_then(into_record))
    }

    fn namespace_records(
        &self,
        scope: &Scope,
        namespace: &str,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE scope_type = ?1 AND scope_id = ?2 AND namespace = ?3 ORDER BY k",
                SELECT_COLUMNS
            ))
            .map_err(|e| StoreError::backend("Failed to prepare namespace query", e))?;
        let rows = stmt
            .query_map(
                params![scope.scope_type.as_str(), &scope.id, namespace],
                read_record,
            )
            .map_err(|e| StoreError::backend("Failed to list state records", e))?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|e| StoreError::backend("Failed to read state record", e))?;
            records.extend(into_record(row));
        }
        Ok(records)
    }

    fn update(&self, write: &RecordWrite<'_>) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp_millis();
        let changed = self
            .lock()
            .execute(
                "UPDATE bot_state
                 SET v_json = ?5, expires_at = ?6, version = version + 1, updated_at = ?7
                 WHERE scope_type = ?1 AND scope_id = ?2 AND namespace = ?3 AND k = ?4",
                params![
                    write.scope.scope_type.as_str(),
                    write.scope.id,
                    write.namespace,
                    write.key,
                    write.json,
                    write.expires_at.map(|at| at.timestamp_millis()),
                    now,
                ],
            )
            .map_err(|e| StoreError::backend("Failed to update state record", e))?;
        Ok(changed > 0)
    }

    fn insert(&self, write: &RecordWrite<'_>) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        let result = self.lock().execute(
            "INSERT INTO bot_state
                (scope_type, scope_id, namespace, k, v_json, expires_at, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            params![
                write.scope.scope_type.as_str(),
                write.scope.id,
                write.namespace,
                write.key,
                write.json,
                write.expires_at.map(|at| at.timestamp_millis()),
                now,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate)
            }
            Err(e) => Err(StoreError::backend("Failed to insert state record", e)),
        }
    }

    fn delete(&self, scope: &Scope, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let removed = self
            .lock()
            .execute(
                "DELETE FROM bot_state
                 WHERE scope_type = ?1 AND scope_id = ?2 AND namespace = ?3 AND k = ?4",
                params![scope.scope_type.as_str(), &scope.id, namespace, key],
            )
            .map_err(|e| StoreError::backend("Failed to delete state record", e))?;
        Ok(removed > 0)
    }
}
