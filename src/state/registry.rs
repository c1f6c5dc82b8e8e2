use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::definition::AnyStateDefinition;

/// All user-visible state definitions, keyed by name.
#[derive(Clone, Default)]
pub struct StateRegistry {
    definitions: BTreeMap<String, Arc<dyn AnyStateDefinition>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. A second definition with the same name is
    /// ignored.
    pub fn register(&mut self, definition: Arc<dyn AnyStateDefinition>) -> bool {
        let info = definition.describe();
        if self.definitions.contains_key(&info.name) {
            warn!("State definition '{}' already registered, skipping", info.name);
            return false;
        }
        info!("Registered state: {}.{}", info.namespace, info.name);
        self.definitions.insert(info.name, definition);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AnyStateDefinition>> {
        self.definitions.get(name)
    }

    /// Definitions sorted by name.
    pub fn list(&self) -> Vec<&Arc<dyn AnyStateDefinition>> {
        self.definitions.values().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
