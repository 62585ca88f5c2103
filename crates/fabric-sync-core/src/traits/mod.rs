//! Core traits for fabric-sync
//!
//! This module defines the abstract interfaces to both external systems.
//!
//! - [`IntentStore`]: read the upstream desired state
//! - [`FabricRepository`]: read and mutate the downstream controller
//! - [`FabricConnector`]: establish a repository session

pub mod fabric_repository;
pub mod intent_store;

pub use fabric_repository::{FabricConnector, FabricConnectorFactory, FabricRepository};
pub use intent_store::{IntentStore, IntentStoreFactory, ROUTER_INTERFACE_OWNER};
