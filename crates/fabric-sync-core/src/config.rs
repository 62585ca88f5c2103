//! Configuration types for fabric-sync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Periods shorter than this trigger an overload warning
pub const RECOMMENDED_MIN_PERIOD: Duration = Duration::from_secs(3600);

/// Main fabric-sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Downstream fabric controller configuration
    pub fabric: FabricConfig,

    /// Upstream intent store configuration
    pub intent_store: IntentStoreConfig,

    /// Reconciliation settings
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.fabric.validate()?;
        self.intent_store.validate()?;
        self.reconciler.validate()?;
        Ok(())
    }
}

/// Fabric controller configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FabricConfig {
    /// Controller REST API
    Vnc {
        /// API server base URL (e.g. "http://10.0.0.10:8082")
        api_url: String,
        /// Optional bearer token
        #[serde(default)]
        auth_token: Option<String>,
        /// HTTP timeout in seconds
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
        /// Log mutations instead of sending them
        #[serde(default)]
        dry_run: bool,
    },

    /// JSON snapshot on disk
    File {
        /// Path to the snapshot file
        path: String,
    },

    /// In-memory repository (not persistent)
    #[default]
    Memory,

    /// Custom connector
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl FabricConfig {
    /// Validate the fabric configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FabricConfig::Vnc {
                api_url,
                timeout_secs,
                ..
            } => {
                validate_url("Fabric API URL", api_url)?;
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Fabric API timeout must be > 0"));
                }
                Ok(())
            }
            FabricConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("Fabric snapshot path cannot be empty"));
                }
                Ok(())
            }
            FabricConfig::Memory => Ok(()),
            FabricConfig::Custom { factory, config } => validate_custom("fabric", factory, config),
        }
    }

    /// Get the backend type name used for registry lookup
    pub fn type_name(&self) -> &str {
        match self {
            FabricConfig::Vnc { .. } => "vnc",
            FabricConfig::File { .. } => "file",
            FabricConfig::Memory => "memory",
            FabricConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Intent store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentStoreConfig {
    /// Networking API v2.0
    Neutron {
        /// API endpoint (e.g. "http://controller:9696")
        endpoint: String,
        /// Keystone token sent as X-Auth-Token
        auth_token: String,
        /// HTTP timeout in seconds
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },

    /// JSON snapshot on disk, re-read on every listing
    File {
        /// Path to the snapshot file
        path: String,
    },

    /// In-memory store (tests and embedding)
    #[default]
    Memory,

    /// Custom intent store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl IntentStoreConfig {
    /// Validate the intent store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IntentStoreConfig::Neutron {
                endpoint,
                auth_token,
                timeout_secs,
            } => {
                validate_url("Intent store endpoint", endpoint)?;
                if auth_token.is_empty() {
                    return Err(crate::Error::config("Intent store auth token cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Intent store timeout must be > 0"));
                }
                Ok(())
            }
            IntentStoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("Intent snapshot path cannot be empty"));
                }
                Ok(())
            }
            IntentStoreConfig::Memory => Ok(()),
            IntentStoreConfig::Custom { factory, config } => {
                validate_custom("intent store", factory, config)
            }
        }
    }

    /// Get the backend type name used for registry lookup
    pub fn type_name(&self) -> &str {
        match self {
            IntentStoreConfig::Neutron { .. } => "neutron",
            IntentStoreConfig::File { .. } => "file",
            IntentStoreConfig::Memory => "memory",
            IntentStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Reconciliation policy and scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Interval between passes: "1h", "30m", "90s" or a bare number of seconds
    #[serde(default = "default_sync_period")]
    pub sync_period: String,

    /// Router flavor provider name that marks routers as ours
    #[serde(default = "default_provider_name")]
    pub provider_name: String,

    /// Value of the `label=<value>` ownership tag
    #[serde(default = "default_ownership_tag")]
    pub ownership_tag: String,

    /// Device owner prefix of ports bound to compute hosts
    #[serde(default = "default_compute_owner_prefix")]
    pub compute_owner_prefix: String,

    /// Device owner of router interface ports
    #[serde(default = "default_router_interface_owner")]
    pub router_interface_owner: String,

    /// Upstream networks whose name contains this marker are infrastructure
    #[serde(default = "default_snat_marker")]
    pub snat_marker: String,

    /// Downstream project owned by the controller itself
    #[serde(default = "default_infra_project")]
    pub infra_project: String,

    /// Overlay roles that qualify a physical router as a gateway
    #[serde(default = "default_gateway_roles")]
    pub gateway_roles: Vec<String>,

    /// Node port labels marking management links (never group members)
    #[serde(default)]
    pub management_port_tags: Vec<String>,

    /// Optional host-wide lock file shared with other processes
    #[serde(default)]
    pub lock_file: Option<String>,

    /// Capacity of the reconcile event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ReconcilerConfig {
    /// Validate the reconciler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        parse_period(&self.sync_period)?;

        if self.provider_name.is_empty() {
            return Err(crate::Error::config("Router provider name cannot be empty"));
        }
        if self.ownership_tag.is_empty() || self.ownership_tag.contains('=') {
            return Err(crate::Error::config(format!(
                "Ownership tag value '{}' must be non-empty and must not contain '='",
                self.ownership_tag
            )));
        }
        if self.compute_owner_prefix.is_empty() {
            return Err(crate::Error::config("Compute owner prefix cannot be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if let Some(path) = &self.lock_file
            && path.is_empty()
        {
            return Err(crate::Error::config("Lock file path cannot be empty"));
        }
        Ok(())
    }

    /// Parsed sync period
    pub fn period(&self) -> Result<Duration, crate::Error> {
        parse_period(&self.sync_period)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sync_period: default_sync_period(),
            provider_name: default_provider_name(),
            ownership_tag: default_ownership_tag(),
            compute_owner_prefix: default_compute_owner_prefix(),
            router_interface_owner: default_router_interface_owner(),
            snat_marker: default_snat_marker(),
            infra_project: default_infra_project(),
            gateway_roles: default_gateway_roles(),
            management_port_tags: Vec::new(),
            lock_file: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Parse a sync period such as "1h", "1.5h", "30m", "45s" or "3600"
pub fn parse_period(value: &str) -> Result<Duration, crate::Error> {
    let value = value.trim();
    let (number, scale) = match value.chars().last() {
        Some('h') => (&value[..value.len() - 1], 3600.0),
        Some('m') => (&value[..value.len() - 1], 60.0),
        Some('s') => (&value[..value.len() - 1], 1.0),
        _ => (value, 1.0),
    };

    let amount: f64 = number
        .trim()
        .parse()
        .map_err(|_| crate::Error::config(format!("Invalid sync period: '{}'", value)))?;

    let secs = amount * scale;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(crate::Error::config(format!(
            "Sync period must be positive, got '{}'",
            value
        )));
    }

    Ok(Duration::from_secs_f64(secs))
}

fn validate_url(what: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{} cannot be empty", what)));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(crate::Error::config(format!(
            "{} must use HTTP or HTTPS scheme. Got: {}",
            what, url
        )));
    }
    Ok(())
}

fn validate_custom(
    what: &str,
    factory: &str,
    config: &serde_json::Value,
) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} factory cannot be empty",
            what
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {} config cannot be null",
            what
        )));
    }
    Ok(())
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_sync_period() -> String {
    "1h".to_string()
}

fn default_provider_name() -> String {
    "networking_opencontrail.l3.service_provider.TFL3ServiceProvider".to_string()
}

fn default_ownership_tag() -> String {
    "__ML2__".to_string()
}

fn default_compute_owner_prefix() -> String {
    "compute:".to_string()
}

fn default_router_interface_owner() -> String {
    "network:router_interface".to_string()
}

fn default_snat_marker() -> String {
    "_snat_".to_string()
}

fn default_infra_project() -> String {
    "default-project".to_string()
}

fn default_gateway_roles() -> Vec<String> {
    ["crb-gateway", "crb-mcast-gateway", "erb-ucast-gateway"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_event_channel_capacity() -> usize {
    1000
}
