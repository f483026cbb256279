//! Closed capability registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use conviction_core::{ArgValue, Capability, CapabilityConfig, CapabilityId, SourceClass};

/// Partial configuration applied on top of registration defaults.
///
/// Fields left unset keep the registered default. Tunables merge key by key,
/// with the override winning on collision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOverride {
    pub enabled: Option<bool>,
    pub tunables: BTreeMap<String, ArgValue>,
}

impl CapabilityOverride {
    pub fn disable() -> Self {
        Self {
            enabled: Some(false),
            ..Self::default()
        }
    }

    pub fn enable() -> Self {
        Self {
            enabled: Some(true),
            ..Self::default()
        }
    }

    pub fn with_tunable(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.tunables.insert(key.into(), value.into());
        self
    }
}

/// Listing row describing one registered capability.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDeclaration {
    pub id: CapabilityId,
    pub name: &'static str,
    pub source_class: SourceClass,
    pub description: String,
    pub params_schema: serde_json::Value,
    /// Enabled state from the registration defaults.
    pub enabled: bool,
}

struct RegistryEntry {
    capability: Arc<dyn Capability>,
    defaults: CapabilityConfig,
}

/// Registry mapping capability identities to implementations and their
/// registration-time default configuration.
///
/// Keyed by [`CapabilityId`] rather than strings, so membership is a
/// compile-visible property. Built once at startup, immutable afterwards.
pub struct CapabilityRegistry {
    entries: BTreeMap<CapabilityId, RegistryEntry>,
}

pub struct CapabilityRegistryBuilder {
    entries: BTreeMap<CapabilityId, RegistryEntry>,
}

impl CapabilityRegistryBuilder {
    pub fn register(self, capability: Arc<dyn Capability>) -> Self {
        self.register_with_defaults(capability, CapabilityConfig::default())
    }

    pub fn register_with_defaults(
        mut self,
        capability: Arc<dyn Capability>,
        defaults: CapabilityConfig,
    ) -> Self {
        let id = capability.id();
        debug!(capability = %id, enabled = defaults.enabled, "registering capability");
        self.entries.insert(
            id,
            RegistryEntry {
                capability,
                defaults,
            },
        );
        self
    }

    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            entries: self.entries,
        }
    }
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder {
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: CapabilityId) -> Option<&Arc<dyn Capability>> {
        self.entries.get(&id).map(|entry| &entry.capability)
    }

    pub fn defaults(&self, id: CapabilityId) -> Option<&CapabilityConfig> {
        self.entries.get(&id).map(|entry| &entry.defaults)
    }

    /// Registration defaults merged with a caller override.
    ///
    /// Returns `None` only when the identity is not registered.
    pub fn effective_config(
        &self,
        id: CapabilityId,
        overrides: Option<&CapabilityOverride>,
    ) -> Option<CapabilityConfig> {
        let entry = self.entries.get(&id)?;
        let mut config = entry.defaults.clone();
        if let Some(o) = overrides {
            if let Some(enabled) = o.enabled {
                config.enabled = enabled;
            }
            for (key, value) in &o.tunables {
                config.tunables.insert(key.clone(), value.clone());
            }
        }
        Some(config)
    }

    pub fn contains(&self, id: CapabilityId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows for listings, in identity order.
    pub fn declarations(&self) -> Vec<CapabilityDeclaration> {
        self.entries
            .iter()
            .map(|(id, entry)| CapabilityDeclaration {
                id: *id,
                name: id.name(),
                source_class: entry.capability.source_class(),
                description: entry.capability.description().to_string(),
                params_schema: entry.capability.params_schema(),
                enabled: entry.defaults.enabled,
            })
            .collect()
    }
}
