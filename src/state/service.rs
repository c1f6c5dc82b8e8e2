use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::definition::StateDefinition;
use super::error::{StateError, ValidationError};
use super::store::{RecordWrite, StateStore};
use super::{Scope, ScopeType};
use crate::message::Address;

/// A resolved value and the scope it came from. `scope` is `None` when
/// nothing was stored and the definition's default was used.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub scope: Option<Scope>,
}

/// Typed reads and writes on top of a [`StateStore`].
#[derive(Clone)]
pub struct StateService {
    store: Arc<dyn StateStore>,
}

impl StateService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Resolve a value, CHAT then USER then GLOBAL, falling back to the
    /// default. Never fails: unreadable, expired or undecodable rows are
    /// treated as absent.
    pub fn resolve<D: StateDefinition>(
        &self,
        def: &D,
        addr: &Address,
        user_id: Option<i64>,
    ) -> D::Value {
        self.resolve_entry(def, addr, user_id).value
    }

    pub fn resolve_entry<D: StateDefinition>(
        &self,
        def: &D,
        addr: &Address,
        user_id: Option<i64>,
    ) -> Resolved<D::Value> {
        self.resolve_at(def, addr, user_id, Utc::now())
    }

    pub fn resolve_at<D: StateDefinition>(
        &self,
        def: &D,
        addr: &Address,
        user_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Resolved<D::Value> {
        for scope in lookup_order(def, addr, user_id) {
            let record = match self.store.get(&scope, def.namespace(), def.name(), now) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to read {} at {}: {}", def.name(), scope, e);
                    continue;
                }
            };
            match serde_json::from_str::<D::Value>(&record.json) {
                Ok(value) => {
                    return Resolved {
                        value,
                        scope: Some(scope),
                    }
                }
                Err(e) => debug!("Ignoring undecodable {} at {}: {}", def.name(), scope, e),
            }
        }
        Resolved {
            value: def.default_value(),
            scope: None,
        }
    }

    /// The single scope writes and deletes go to: the preferred scope, else
    /// the first of USER, CHAT, GLOBAL the definition allows. USER needs a
    /// user id. `None` if no scope qualifies.
    pub fn preferred_scope<D: StateDefinition>(
        &self,
        def: &D,
        addr: &Address,
        user_id: Option<i64>,
    ) -> Option<Scope> {
        [
            def.preferred_scope(),
            ScopeType::User,
            ScopeType::Chat,
            ScopeType::Global,
        ]
        .into_iter()
        .filter(|t| def.allows(*t))
        .find_map(|t| scope_of(t, addr, user_id))
    }

    /// Parse `raw` and write it. Validation failures come back as
    /// `StateError::Validation` with a user-facing message.
    pub fn set<D: StateDefinition>(
        &self,
        def: &D,
        addr: &Address,
        user_id: Option<i64>,
        raw: &str,
    ) -> Result<(Scope, D::Value), StateError> {
        let value = def.parse(raw.trim())?;
        let scope = self.set_value(def, addr, user_id, &value)?;
        Ok((scope, value))
    }

    pub fn set_value<D: StateDefinition>(
        &self,
        def: &D,
        addr: &Address,
        user_id: Option<i64>,
        value: &D::Value,
    ) -> Result<Scope, StateError> {
        def.validate(value)?;
        let scope = self
            .preferred_scope(def, addr, user_id)
            .ok_or_else(|| no_scope(def))?;
        let json = serde_json::to_string(value)?;
        let expires_at = def.ttl().map(|ttl| Utc::now() + ttl);

        self.store.upsert(&RecordWrite {
            scope: &scope,
            namespace: def.namespace(),
            key: def.name(),
            json: &json,
            expires_at,
        })?;

        info!("State {}.{} set at {}", def.namespace(), def.name(), scope);
        Ok(scope)
    }

    /// Delete the value at the preferred scope only.
    pub fn clear<D: StateDefinition>(
        &self,
        def: &D,
        addr: &Address,
        user_id: Option<i64>,
    ) -> Result<(Scope, bool), StateError> {
        let scope = self
            .preferred_scope(def, addr, user_id)
            .ok_or_else(|| no_scope(def))?;
        let removed = self.store.delete(&scope, def.namespace(), def.name())?;
        if removed {
            info!("State {}.{} cleared at {}", def.namespace(), def.name(), scope);
        }
        Ok((scope, removed))
    }
}

fn lookup_order<D: StateDefinition>(def: &D, addr: &Address, user_id: Option<i64>) -> Vec<Scope> {
    [ScopeType::Chat, ScopeType::User, ScopeType::Global]
        .into_iter()
        .filter(|t| def.allows(*t))
        .filter_map(|t| scope_of(t, addr, user_id))
        .collect()
}

fn scope_of(scope_type: ScopeType, addr: &Address, user_id: Option<i64>) -> Option<Scope> {
    match scope_type {
        ScopeType::Chat => Some(Scope::chat(addr)),
        ScopeType::User => user_id.map(|id| Scope::user(addr.platform, id)),
        ScopeType::Global => Some(Scope::global()),
    }
}

fn no_scope<D: StateDefinition>(def: &D) -> StateError {
    ValidationError::new(format!("'{}' cannot be set from here", def.name())).into()
}
