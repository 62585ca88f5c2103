//! Plugin-based backend registry
//!
//! Fabric connectors and intent stores are looked up by type name at
//! runtime, so the daemon never hardcodes which backends exist.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fabric_sync_core::registry::BackendRegistry;
//!
//! let registry = BackendRegistry::with_builtin();
//! fabric_sync_vnc::register(&registry);
//!
//! let connector = registry.create_connector(&config.fabric)?;
//! let intent = registry.create_intent_store(&config.intent_store)?;
//! ```
//!
//! ## Registration
//!
//! Backend crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &BackendRegistry) {
//!     registry.register_fabric("vnc", Box::new(VncConnectorFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backends::{
    FileFabricFactory, FileIntentStoreFactory, MemoryFabricFactory, MemoryIntentStoreFactory,
};
use crate::config::{FabricConfig, IntentStoreConfig};
use crate::error::{Error, Result};
use crate::traits::{FabricConnector, FabricConnectorFactory, IntentStore, IntentStoreFactory};

/// Registry of backend factories
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent lookups, exclusive
/// registration.
#[derive(Default)]
pub struct BackendRegistry {
    /// Registered fabric connector factories
    fabrics: RwLock<HashMap<String, Box<dyn FabricConnectorFactory>>>,

    /// Registered intent store factories
    intent_stores: RwLock<HashMap<String, Box<dyn IntentStoreFactory>>>,
}

// A panic while holding a registry lock cannot leave a map half-updated, so a
// poisoned lock is still safe to use.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` backends of both sides
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_fabric("memory", Box::new(MemoryFabricFactory));
        registry.register_fabric("file", Box::new(FileFabricFactory));
        registry.register_intent_store("memory", Box::new(MemoryIntentStoreFactory));
        registry.register_intent_store("file", Box::new(FileIntentStoreFactory));
        registry
    }

    /// Register a fabric connector factory under `name` (e.g. "vnc")
    pub fn register_fabric(&self, name: impl Into<String>, factory: Box<dyn FabricConnectorFactory>) {
        write(&self.fabrics).insert(name.into(), factory);
    }

    /// Register an intent store factory under `name` (e.g. "neutron")
    pub fn register_intent_store(&self, name: impl Into<String>, factory: Box<dyn IntentStoreFactory>) {
        write(&self.intent_stores).insert(name.into(), factory);
    }

    /// Create a fabric connector from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn FabricConnector>)`: Created connector
    /// - `Err(Error::Config)`: If the backend type is not registered
    pub fn create_connector(&self, config: &FabricConfig) -> Result<Box<dyn FabricConnector>> {
        let backend = config.type_name();
        let fabrics = read(&self.fabrics);
        let factory = fabrics
            .get(backend)
            .ok_or_else(|| Error::config(format!("Unknown fabric backend: {}", backend)))?;
        factory.create(config)
    }

    /// Create an intent store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IntentStore>)`: Created store
    /// - `Err(Error::Config)`: If the store type is not registered
    pub fn create_intent_store(&self, config: &IntentStoreConfig) -> Result<Box<dyn IntentStore>> {
        let backend = config.type_name();
        let stores = read(&self.intent_stores);
        let factory = stores
            .get(backend)
            .ok_or_else(|| Error::config(format!("Unknown intent store type: {}", backend)))?;
        factory.create(config)
    }

    /// Registered fabric backend names
    pub fn list_fabrics(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.fabrics).keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered intent store names
    pub fn list_intent_stores(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.intent_stores).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_fabric(&self, name: &str) -> bool {
        read(&self.fabrics).contains_key(name)
    }

    pub fn has_intent_store(&self, name: &str) -> bool {
        read(&self.intent_stores).contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingFactory;

    impl FabricConnectorFactory for FailingFactory {
        fn create(&self, _config: &FabricConfig) -> Result<Box<dyn FabricConnector>> {
            Err(Error::not_found("Mock connector not implemented"))
        }
    }

    #[test]
    fn registers_and_lists_backends() {
        let registry = BackendRegistry::new();
        assert!(!registry.has_fabric("mock"));

        registry.register_fabric("mock", Box::new(FailingFactory));

        assert!(registry.has_fabric("mock"));
        assert_eq!(registry.list_fabrics(), vec!["mock".to_string()]);
        assert!(registry.list_intent_stores().is_empty());
    }

    #[test]
    fn builtin_backends_are_registered() {
        let registry = BackendRegistry::with_builtin();
        assert_eq!(registry.list_fabrics(), vec!["file", "memory"]);
        assert_eq!(registry.list_intent_stores(), vec!["file", "memory"]);

        let connector = registry.create_connector(&FabricConfig::Memory).unwrap();
        assert_eq!(connector.backend_name(), "memory");

        let store = registry
            .create_intent_store(&IntentStoreConfig::File {
                path: "/tmp/intent.json".into(),
            })
            .unwrap();
        assert_eq!(store.store_name(), "file");
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let registry = BackendRegistry::with_builtin();
        let config = FabricConfig::Vnc {
            api_url: "http://controller:8082".into(),
            auth_token: None,
            timeout_secs: 30,
            dry_run: false,
        };
        let err = registry.create_connector(&config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
