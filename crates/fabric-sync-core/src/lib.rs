// # fabric-sync-core
//
// Core library for the one-directional network fabric reconciler.
//
// ## Architecture Overview
//
// Desired state lives in an intent store (networks, subnets, ports, routers).
// The fabric controller holds the realized objects. This library keeps the
// second eventually consistent with the first:
// - **IntentStore**: Trait for reading upstream desired state
// - **FabricRepository**: Trait for reading and mutating fabric objects
// - **Synchronizer**: Per-kind diff and mutation contract
// - **Reconciler**: Ordered passes with per-item failure isolation
// - **PeriodicScheduler**: Background loop that repairs drift
// - **IntentEventHandler**: Immediate propagation of single upstream events
// - **BackendRegistry**: Plugin-based registry for both backends
//
// ## Ownership
//
// Every fabric object created here carries the `label=<ownership tag>` tag.
// Objects without it are never mutated or deleted.

pub mod assembly;
pub mod backends;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod lock;
pub mod model;
pub mod registry;
pub mod session;
pub mod sync;
pub mod tagger;
pub mod traits;

// Re-export core types for convenience
pub use traits::{FabricConnector, FabricRepository, IntentStore};
pub use engine::{PassReport, PeriodicScheduler, ReconcileEvent, Reconciler, SchedulerState};
pub use registry::BackendRegistry;
pub use config::{FabricConfig, IntentStoreConfig, ReconcilerConfig, SyncConfig};
pub use error::{Error, Result};
pub use handlers::IntentEventHandler;
pub use lock::SyncLock;
pub use session::FabricSession;
pub use tagger::OwnershipTag;
