// # Intent Store Trait
//
// Defines the interface to the upstream source of truth.
//
// ## Purpose
//
// The intent store holds the desired network topology. fabric-sync only ever
// reads from it: listings feed the reconciliation diff, point lookups feed
// event handlers and ignore checks.
//
// ## Implementations
//
// - `fabric-sync-neutron`: networking API v2.0 over HTTP
// - `MemoryIntentStore` / `FileIntentStore`: snapshots for tests and offline runs

use async_trait::async_trait;

use crate::Result;
use crate::config::IntentStoreConfig;
use crate::model::{Network, Port, PortFilter, Router, Subnet};

/// Device owner of ports that attach a subnet to a router
pub const ROUTER_INTERFACE_OWNER: &str = "network:router_interface";

/// Trait for upstream intent store implementations
///
/// Listings return the store's current state; each call is an independent
/// snapshot. Point lookups return `Ok(None)` when the resource does not exist.
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// List all networks
    async fn list_networks(&self) -> Result<Vec<Network>>;

    /// List all subnets
    async fn list_subnets(&self) -> Result<Vec<Subnet>>;

    /// List ports matching `filter`
    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>>;

    /// List all routers
    async fn list_routers(&self) -> Result<Vec<Router>>;

    /// List ports that connect subnets to routers
    async fn list_router_interfaces(&self) -> Result<Vec<Port>> {
        self.list_ports(&PortFilter::by_device_owner(ROUTER_INTERFACE_OWNER))
            .await
    }

    /// Look up one network
    async fn get_network(&self, id: &str) -> Result<Option<Network>>;

    /// Look up one router
    async fn get_router(&self, id: &str) -> Result<Option<Router>>;

    /// Look up one port
    async fn get_port(&self, id: &str) -> Result<Option<Port>>;

    /// Resolve the provider (driver) name bound to a router flavor
    ///
    /// # Returns
    ///
    /// - `Ok(Some(name))`: the flavor's provider
    /// - `Ok(None)`: unknown flavor or flavor without a provider
    async fn get_flavor_provider(&self, flavor_id: &str) -> Result<Option<String>>;

    /// Backend name for logs
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing intent stores from configuration
pub trait IntentStoreFactory: Send + Sync {
    /// Create an IntentStore instance from configuration
    fn create(&self, config: &IntentStoreConfig) -> Result<Box<dyn IntentStore>>;
}
