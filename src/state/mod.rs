//! Scoped, persisted key/value settings.
//!
//! A value lives at one of three scopes (GLOBAL, USER or CHAT). Reads fall
//! back from the most specific scope to the least; writes go to a single
//! preferred scope. Expired records are skipped at read time and never swept.

pub mod builtin;
pub mod definition;
pub mod error;
pub mod memory;
pub mod registry;
pub mod service;
pub mod sqlite;
pub mod store;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::{StateBackend, StateConfig};
use crate::message::{Address, Platform};

pub use definition::{AnyStateDefinition, DefinitionInfo, StateDefinition};
pub use error::{StateError, StoreError, ValidationError};
pub use memory::MemoryStateStore;
pub use registry::StateRegistry;
pub use service::StateService;
pub use sqlite::SqliteStateStore;
pub use store::{RecordWrite, StateStore, UPSERT_ATTEMPTS};

/// Scope id used for the single GLOBAL scope.
pub const GLOBAL_SCOPE_ID: &str = "_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeType {
    Global,
    User,
    Chat,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Global => "GLOBAL",
            ScopeType::User => "USER",
            ScopeType::Chat => "CHAT",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GLOBAL" => Ok(ScopeType::Global),
            "USER" => Ok(ScopeType::User),
            "CHAT" => Ok(ScopeType::Chat),
            other => Err(format!("unknown scope type: {}", other)),
        }
    }
}

/// Where a value is stored. Equal iff type and id are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub scope_type: ScopeType,
    pub id: String,
}

impl Scope {
    pub fn global() -> Self {
        Self {
            scope_type: ScopeType::Global,
            id: GLOBAL_SCOPE_ID.to_string(),
        }
    }

    pub fn user(platform: Platform, user_id: i64) -> Self {
        Self {
            scope_type: ScopeType::User,
            id: format!("{}:{}", platform, user_id),
        }
    }

    pub fn chat(addr: &Address) -> Self {
        Self {
            scope_type: ScopeType::Chat,
            id: addr.chat_key(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.scope_type, self.id)
    }
}

/// One stored value. `json` is kept as text; decoding into a typed value
/// happens in the service so that a bad row only hides itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub scope: Scope,
    pub namespace: String,
    pub key: String,
    pub json: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl StateRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// The backend selected by `[state]`.
pub fn open_store(config: &StateConfig) -> Result<Arc<dyn StateStore>> {
    match config.backend {
        StateBackend::Sqlite => Ok(Arc::new(SqliteStateStore::open(&config.database_path)?)),
        StateBackend::Memory => {
            warn!("Using the in-memory state store; settings are lost on restart");
            info!("State store initialized in memory");
            Ok(Arc::new(MemoryStateStore::new()))
        }
    }
}
