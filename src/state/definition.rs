use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{StateError, ValidationError};
use super::service::StateService;
use super::{Scope, ScopeType};
use crate::message::Address;

/// A typed, user-configurable setting.
///
/// `namespace` + `name` identify the stored row. `parse` turns user input
/// into a value, `validate` checks values from any source before they are
/// written.
pub trait StateDefinition: Send + Sync + 'static {
    type Value: Serialize + DeserializeOwned + Clone + Send + Sync;

    fn namespace(&self) -> &str {
        "prefs"
    }

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn allowed_scopes(&self) -> &[ScopeType];

    fn preferred_scope(&self) -> ScopeType;

    fn default_value(&self) -> Self::Value;

    fn parse(&self, raw: &str) -> Result<Self::Value, ValidationError>;

    fn validate(&self, _value: &Self::Value) -> Result<(), ValidationError> {
        Ok(())
    }

    fn format(&self, value: &Self::Value) -> String;

    /// Example values shown in listings.
    fn suggest_values(&self) -> Vec<String> {
        Vec::new()
    }

    /// Lifetime of a written value; `None` keeps it forever.
    fn ttl(&self) -> Option<Duration> {
        None
    }

    fn allows(&self, scope_type: ScopeType) -> bool {
        self.allowed_scopes().contains(&scope_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionInfo {
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub allowed_scopes: Vec<ScopeType>,
    pub preferred_scope: ScopeType,
    pub suggestions: Vec<String>,
    pub ttl: Option<Duration>,
}

/// Type-erased view of a definition, for code that only deals in text
/// (listings and the `pref` command).
pub trait AnyStateDefinition: Send + Sync {
    fn describe(&self) -> DefinitionInfo;

    /// Resolved value formatted for display, plus the scope it came from
    /// (`None` when the default was used).
    fn resolve_display(
        &self,
        service: &StateService,
        addr: &Address,
        user_id: Option<i64>,
    ) -> (String, Option<Scope>);

    /// Parse, validate and store `raw`; returns the scope written and the
    /// formatted value.
    fn write_raw(
        &self,
        service: &StateService,
        addr: &Address,
        user_id: Option<i64>,
        raw: &str,
    ) -> Result<(Scope, String), StateError>;

    /// Remove the value at the preferred scope. Returns that scope and whether
    /// anything was removed.
    fn clear_at_preferred(
        &self,
        service: &StateService,
        addr: &Address,
        user_id: Option<i64>,
    ) -> Result<(Scope, bool), StateError>;
}

impl<D: StateDefinition> AnyStateDefinition for D {
    fn describe(&self) -> DefinitionInfo {
        DefinitionInfo {
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            allowed_scopes: self.allowed_scopes().to_vec(),
            preferred_scope: self.preferred_scope(),
            suggestions: self.suggest_values(),
            ttl: self.ttl(),
        }
    }

    fn resolve_display(
        &self,
        service: &StateService,
        addr: &Address,
        user_id: Option<i64>,
    ) -> (String, Option<Scope>) {
        let resolved = service.resolve_entry(self, addr, user_id);
        (self.format(&resolved.value), resolved.scope)
    }

    fn write_raw(
        &self,
        service: &StateService,
        addr: &Address,
        user_id: Option<i64>,
        raw: &str,
    ) -> Result<(Scope, String), StateError> {
        let (scope, value) = service.set(self, addr, user_id, raw)?;
        Ok((scope, self.format(&value)))
    }

    fn clear_at_preferred(
        &self,
        service: &StateService,
        addr: &Address,
        user_id: Option<i64>,
    ) -> Result<(Scope, bool), StateError> {
        service.clear(self, addr, user_id)
    }
}
