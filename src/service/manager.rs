use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{BotService, ServiceState};
use crate::command::dispatcher::panic_message;
use crate::command::CommandSource;
use crate::message::{Address, InboundMessage, OutboundMessage};
use crate::state::{RecordWrite, Scope, StateError, StateStore, ValidationError};

/// State store namespace holding service states.
pub const SERVICE_NAMESPACE: &str = "service";

/// Registered services and their per-chat on/off state.
pub struct ServiceManager {
    services: BTreeMap<String, Arc<dyn BotService>>,
    disabled: Vec<String>,
    store: Arc<dyn StateStore>,
}

impl ServiceManager {
    /// `disabled` names services that may not be registered at all.
    pub fn new(store: Arc<dyn StateStore>, disabled: Vec<String>) -> Self {
        Self {
            services: BTreeMap::new(),
            disabled,
            store,
        }
    }

    pub fn register(&mut self, service: Arc<dyn BotService>) -> bool {
        let name = service.name().to_string();
        if self.disabled.contains(&name) {
            info!("Service disabled by config: {}", name);
            return false;
        }
        if self.services.contains_key(&name) {
            warn!("Service '{}' already registered, skipping", name);
            return false;
        }
        info!("Registered service: {}", name);
        self.services.insert(name, service);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn BotService>> {
        self.services.get(name)
    }

    /// Services sorted by name.
    pub fn list(&self) -> Vec<&Arc<dyn BotService>> {
        self.services.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// The chat's state for `name`: its own row, else the GLOBAL default row,
    /// else disabled with the service's default config.
    pub fn state_of(&self, addr: &Address, name: &str) -> Result<ServiceState, StateError> {
        let service = self.lookup(name)?;
        for scope in [Scope::chat(addr), Scope::global()] {
            if let Some(state) = self.read(&scope, name)? {
                return Ok(state);
            }
        }
        Ok(ServiceState {
            enabled: false,
            config: service.default_config(),
        })
    }

    pub fn set_enabled(
        &self,
        addr: &Address,
        name: &str,
        enabled: bool,
    ) -> Result<ServiceState, StateError> {
        let mut state = self.state_of(addr, name)?;
        state.enabled = enabled;
        self.write(addr, name, &state)?;
        info!(
            "Service {} {} in {}",
            name,
            if enabled { "enabled" } else { "disabled" },
            addr
        );
        Ok(state)
    }

    /// Set one config entry for the chat; `None` removes it.
    pub fn set_config(
        &self,
        addr: &Address,
        name: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<ServiceState, StateError> {
        let mut state = self.state_of(addr, name)?;
        match value {
            Some(value) => state.config.insert(key.to_string(), value.to_string()),
            None => state.config.remove(key),
        };
        self.write(addr, name, &state)?;
        Ok(state)
    }

    /// Run every service enabled in the message's chat and collect what they
    /// reply. Failing services are logged and skipped.
    pub fn on_message(&self, message: &Arc<InboundMessage>) -> Vec<OutboundMessage> {
        if self.services.is_empty() {
            return Vec::new();
        }
        let addr = message.addr();
        let source = CommandSource::for_inbound(Arc::clone(message));

        for (name, service) in &self.services {
            let state = match self.state_of(addr, name) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Failed to load service {} state for {}: {}", name, addr, e);
                    continue;
                }
            };
            if !state.enabled {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                service.on_message(&source, &state.config, message)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Service {} failed on message in {}: {:?}", name, addr, e),
                Err(payload) => warn!(
                    "Service {} panicked on message in {}: {}",
                    name,
                    addr,
                    panic_message(payload.as_ref())
                ),
            }
        }
        source.into_replies()
    }

    fn lookup(&self, name: &str) -> Result<&Arc<dyn BotService>, StateError> {
        self.services
            .get(name)
            .ok_or_else(|| ValidationError::new(format!("Unknown service: {}", name)).into())
    }

    fn read(&self, scope: &Scope, name: &str) -> Result<Option<ServiceState>, StateError> {
        let Some(record) = self.store.get(scope, SERVICE_NAMESPACE, name, Utc::now())? else {
            return Ok(None);
        };
        match serde_json::from_str(&record.json) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                debug!("Ignoring undecodable service state at {} for {}: {}", scope, name, e);
                Ok(None)
            }
        }
    }

    fn write(&self, addr: &Address, name: &str, state: &ServiceState) -> Result<(), StateError> {
        let json = serde_json::to_string(state)?;
        self.store.upsert(&RecordWrite {
            scope: &Scope::chat(addr),
            namespace: SERVICE_NAMESPACE,
            key: name,
            json: &json,
            expires_at: None,
        })
    }
}
