// # Networking API Intent Store
//
// This crate reads desired network state from the networking API v2.0
// (Neutron) over HTTP.
//
// ## Requests
//
// - `GET /v2.0/networks`, `/v2.0/subnets`, `/v2.0/routers`
// - `GET /v2.0/ports?network_id=..&binding:host_id=..&device_owner=..`
// - `GET /v2.0/<collection>/<id>` for point lookups (404 → `None`)
// - `GET /v2.0/flavors/<id>` then `GET /v2.0/service_profiles/<id>` to
//   resolve a router flavor to its provider driver
//
// The store is read-only and keeps no cache: every call is a fresh snapshot.
//
// ## Security
//
// The token is sent as `X-Auth-Token` and never appears in logs or Debug
// output.

use async_trait::async_trait;
use fabric_sync_core::config::IntentStoreConfig;
use fabric_sync_core::model::{Network, Port, PortFilter, Router, Subnet};
use fabric_sync_core::registry::BackendRegistry;
use fabric_sync_core::traits::{IntentStore, IntentStoreFactory};
use fabric_sync_core::{Error, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default HTTP timeout for API requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const BACKEND: &str = "neutron";

const API_PREFIX: &str = "v2.0";

/// Intent store over the networking API
pub struct NeutronIntentStore {
    /// API endpoint, without a trailing slash
    endpoint: String,

    /// Keystone token
    /// ⚠️ NEVER log this value
    auth_token: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for NeutronIntentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeutronIntentStore")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<REDACTED>")
            .finish()
    }
}

impl NeutronIntentStore {
    /// Create a new store
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the token is empty or the client cannot be built
    pub fn new(
        endpoint: impl Into<String>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let auth_token = auth_token.into();
        if auth_token.is_empty() {
            return Err(Error::config("Networking API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth_token,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.endpoint, API_PREFIX, path)
    }

    /// GET a JSON document; `Ok(None)` means 404
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.url(path))
            .header("X-Auth-Token", &self.auth_token)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| Error::intent_store(BACKEND, format!("GET {} failed: {}", path, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, path, &body));
        }

        let body = response.json().await.map_err(|e| {
            Error::intent_store(BACKEND, format!("Failed to parse {} response: {}", path, e))
        })?;
        Ok(Some(body))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        match self.get(collection, query).await? {
            Some(body) => unwrap_member(body, collection),
            None => Err(Error::intent_store(
                BACKEND,
                format!("Collection {} does not exist", collection),
            )),
        }
    }

    async fn show<T: DeserializeOwned>(
        &self,
        collection: &str,
        member: &str,
        id: &str,
    ) -> Result<Option<T>> {
        match self.get(&format!("{}/{}", collection, id), &[]).await? {
            Some(body) => Ok(Some(unwrap_member(body, member)?)),
            None => Ok(None),
        }
    }
}

/// Map a non-success, non-404 status to an error
pub fn status_error(status: StatusCode, path: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Networking API rejected the token for {}. Status: {}",
            path, status
        )),
        _ => Error::intent_store(BACKEND, format!("GET {}: {} - {}", path, status, body)),
    }
}

/// Extract `body[key]` and deserialize it
fn unwrap_member<T: DeserializeOwned>(mut body: Value, key: &str) -> Result<T> {
    let member = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| Error::intent_store(BACKEND, format!("Response has no '{}' member", key)))?;
    serde_json::from_value(member)
        .map_err(|e| Error::intent_store(BACKEND, format!("Invalid '{}' member: {}", key, e)))
}

/// Query pairs for a port filter, using the API's field names
pub fn port_query(filter: &PortFilter) -> Vec<(&'static str, &str)> {
    let mut query = Vec::new();
    if let Some(network_id) = &filter.network_id {
        query.push(("network_id", network_id.as_str()));
    }
    if let Some(host_id) = &filter.host_id {
        query.push(("binding:host_id", host_id.as_str()));
    }
    if let Some(device_owner) = &filter.device_owner {
        query.push(("device_owner", device_owner.as_str()));
    }
    query
}

#[async_trait]
impl IntentStore for NeutronIntentStore {
    async fn list_networks(&self) -> Result<Vec<Network>> {
        self.list("networks", &[]).await
    }

    async fn list_subnets(&self) -> Result<Vec<Subnet>> {
        self.list("subnets", &[]).await
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>> {
        let ports: Vec<Port> = self.list("ports", &port_query(filter)).await?;
        // The server already filters; this keeps the contract even if it ignores a field
        Ok(ports.into_iter().filter(|p| filter.matches(p)).collect())
    }

    async fn list_routers(&self) -> Result<Vec<Router>> {
        self.list("routers", &[]).await
    }

    async fn get_network(&self, id: &str) -> Result<Option<Network>> {
        self.show("networks", "network", id).await
    }

    async fn get_router(&self, id: &str) -> Result<Option<Router>> {
        self.show("routers", "router", id).await
    }

    async fn get_port(&self, id: &str) -> Result<Option<Port>> {
        self.show("ports", "port", id).await
    }

    async fn get_flavor_provider(&self, flavor_id: &str) -> Result<Option<String>> {
        let Some(flavor) = self.show::<Value>("flavors", "flavor", flavor_id).await? else {
            debug!("Flavor {} does not exist", flavor_id);
            return Ok(None);
        };

        let Some(profile_id) = flavor["service_profiles"]
            .as_array()
            .and_then(|profiles| profiles.first())
            .and_then(Value::as_str)
        else {
            debug!("Flavor {} has no service profile", flavor_id);
            return Ok(None);
        };

        let profile: Option<Value> = self
            .show("service_profiles", "service_profile", profile_id)
            .await?;
        Ok(profile.and_then(|p| p["driver"].as_str().map(String::from)))
    }

    fn store_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for creating networking API intent stores
pub struct NeutronStoreFactory;

impl IntentStoreFactory for NeutronStoreFactory {
    fn create(&self, config: &IntentStoreConfig) -> Result<Box<dyn IntentStore>> {
        match config {
            IntentStoreConfig::Neutron {
                endpoint,
                auth_token,
                timeout_secs,
            } => {
                config.validate()?;
                Ok(Box::new(NeutronIntentStore::new(
                    endpoint.clone(),
                    auth_token.clone(),
                    Duration::from_secs(*timeout_secs),
                )?))
            }
            _ => Err(Error::config("Invalid config for the neutron intent store")),
        }
    }
}

/// Register the networking API store under the `neutron` type name
///
/// # Example
///
/// ```rust
/// use fabric_sync_core::BackendRegistry;
///
/// let registry = BackendRegistry::with_builtin();
/// fabric_sync_neutron::register(&registry);
/// assert!(registry.has_intent_store("neutron"));
/// ```
pub fn register(registry: &BackendRegistry) {
    registry.register_intent_store(BACKEND, Box::new(NeutronStoreFactory));
}
