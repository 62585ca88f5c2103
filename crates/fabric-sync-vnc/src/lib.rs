// # Fabric Controller REST Repository
//
// This crate implements `FabricRepository` over the fabric controller's REST
// API (the VNC configuration API).
//
// ## Request Mapping
//
// | Operation | Request |
// |-----------|---------|
// | list      | `GET /<type>s?detail=true` |
// | read      | `GET /<type>/<uuid>` |
// | read by name | `POST /fqname-to-id`, then read |
// | create    | `POST /<type>s` |
// | update    | `PUT /<type>/<uuid>` |
// | delete    | `DELETE /<type>/<uuid>` |
//
// ## Status Mapping
//
// - 401/403 → `Error::Authentication`
// - 404 → `Ok(None)` on reads, `Ok(())` on deletes
// - 409 → `Error::AlreadyExists`
// - 5xx and anything else → `Error::Repository`
// - Transport failures → `Error::Connection`
//
// Nothing here retries; the next reconciliation pass does.
//
// ## Security
//
// The bearer token never appears in logs or Debug output.

pub mod wire;

use async_trait::async_trait;
use fabric_sync_core::config::FabricConfig;
use fabric_sync_core::model::{
    Fabric, FqName, LogicalRouter, NetworkIpam, Node, NodePort, PhysicalRouter, Project, Tag,
    VirtualMachineInterface, VirtualNetwork, VirtualPortGroup,
};
use fabric_sync_core::model::fabric::GLOBAL_SYSTEM_CONFIG;
use fabric_sync_core::registry::BackendRegistry;
use fabric_sync_core::traits::{FabricConnector, FabricConnectorFactory, FabricRepository};
use fabric_sync_core::{Error, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use wire::{
    ObjectType, WireIdentity, WireLogicalRouter, WireNetworkIpam, WireNode, WirePhysicalRouter,
    WirePort, WireTag, WireVirtualMachineInterface, WireVirtualNetwork, WireVirtualPortGroup,
    envelope, open_collection, open_envelope,
};

/// Default HTTP timeout for API requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const BACKEND: &str = "vnc";

/// Connection settings for the controller API
#[derive(Clone)]
pub struct VncSettings {
    /// API server base URL, without a trailing slash
    pub api_url: String,

    /// Optional bearer token
    /// ⚠️ NEVER log this value
    pub auth_token: Option<String>,

    pub timeout: Duration,

    /// Log mutations instead of sending them
    pub dry_run: bool,
}

impl VncSettings {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
            dry_run: false,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for VncSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VncSettings")
            .field("api_url", &self.api_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("timeout", &self.timeout)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// `FabricRepository` over the controller REST API
///
/// # Dry-Run Mode
///
/// When `dry_run` is set, reads go to the controller as usual while creates,
/// updates and deletes are only logged with their payload.
#[derive(Debug)]
pub struct VncRepository {
    settings: VncSettings,
    client: reqwest::Client,
}

impl VncRepository {
    /// Build a repository; no request is made
    pub fn new(settings: VncSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &VncSettings {
        &self.settings
    }

    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.settings.api_url, path.trim_start_matches('/'));
        let builder = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json");
        match &self.settings.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request; `Ok(None)` means 404
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Option<Response>> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::connection(format!("{}: HTTP request failed: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(status_error(status, what, &body))
    }

    async fn get_json(&self, path: &str, what: &str) -> Result<Option<Value>> {
        match self.send(self.request(Method::GET, path), what).await? {
            Some(response) => Ok(Some(parse_json(response, what).await?)),
            None => Ok(None),
        }
    }

    async fn list<W: DeserializeOwned>(&self, kind: ObjectType) -> Result<Vec<W>> {
        let path = format!("{}?detail=true", kind.plural());
        let what = format!("list {}", kind.plural());
        match self.get_json(&path, &what).await? {
            Some(body) => open_collection(kind, body),
            None => Ok(Vec::new()),
        }
    }

    async fn read<W: DeserializeOwned>(&self, kind: ObjectType, uuid: &str) -> Result<Option<W>> {
        let what = format!("read {} {}", kind, uuid);
        match self.get_json(&format!("{}/{}", kind, uuid), &what).await? {
            Some(body) => Ok(Some(open_envelope(kind, body)?)),
            None => Ok(None),
        }
    }

    /// Resolve an fq_name to a uuid
    async fn fq_name_to_id(&self, kind: ObjectType, fq_name: &FqName) -> Result<Option<String>> {
        let what = format!("resolve {} {}", kind, fq_name.join(":"));
        let body = serde_json::json!({ "type": kind.as_str(), "fq_name": fq_name });
        let Some(response) = self
            .send(self.request(Method::POST, "fqname-to-id").json(&body), &what)
            .await?
        else {
            return Ok(None);
        };
        let json = parse_json(response, &what).await?;
        json["uuid"]
            .as_str()
            .map(|uuid| Some(uuid.to_string()))
            .ok_or_else(|| Error::repository(BACKEND, format!("{}: response has no uuid", what)))
    }

    async fn read_by_name<W: DeserializeOwned>(
        &self,
        kind: ObjectType,
        fq_name: &FqName,
    ) -> Result<Option<W>> {
        match self.fq_name_to_id(kind, fq_name).await? {
            Some(uuid) => self.read(kind, &uuid).await,
            None => Ok(None),
        }
    }

    async fn create<W: Serialize>(&self, kind: ObjectType, uuid: &str, body: &W) -> Result<()> {
        let payload = envelope(kind, body)?;
        if self.settings.dry_run {
            info!("[DRY-RUN] Would POST /{} with payload: {}", kind.plural(), payload);
            return Ok(());
        }

        let what = format!("create {} {}", kind, uuid);
        match self
            .send(self.request(Method::POST, &kind.plural()).json(&payload), &what)
            .await?
        {
            Some(_) => {
                debug!("Created {} {}", kind, uuid);
                Ok(())
            }
            // The parent or a referenced object is missing
            None => Err(Error::not_found(what)),
        }
    }

    async fn update<W: Serialize>(&self, kind: ObjectType, uuid: &str, body: &W) -> Result<()> {
        let payload = envelope(kind, body)?;
        if self.settings.dry_run {
            info!("[DRY-RUN] Would PUT /{}/{} with payload: {}", kind, uuid, payload);
            return Ok(());
        }

        let what = format!("update {} {}", kind, uuid);
        let path = format!("{}/{}", kind, uuid);
        match self.send(self.request(Method::PUT, &path).json(&payload), &what).await? {
            Some(_) => {
                debug!("Updated {} {}", kind, uuid);
                Ok(())
            }
            None => Err(Error::not_found(format!("{} {}", kind, uuid))),
        }
    }

    async fn delete(&self, kind: ObjectType, uuid: &str) -> Result<()> {
        if self.settings.dry_run {
            info!("[DRY-RUN] Would DELETE /{}/{}", kind, uuid);
            return Ok(());
        }

        let what = format!("delete {} {}", kind, uuid);
        let path = format!("{}/{}", kind, uuid);
        match self.send(self.request(Method::DELETE, &path), &what).await? {
            Some(_) => debug!("Deleted {} {}", kind, uuid),
            None => debug!("{} {} already gone", kind, uuid),
        }
        Ok(())
    }

    /// Read a node together with its ports
    async fn expand_node(&self, node: WireNode) -> Result<Node> {
        let mut ports = Vec::with_capacity(node.ports.len());
        for port_ref in &node.ports {
            match self.read::<WirePort>(ObjectType::Port, &port_ref.uuid).await? {
                Some(port) => ports.push(NodePort::from(port)),
                None => debug!("Port {} of node {} vanished", port_ref.uuid, node.uuid),
            }
        }
        Ok(node.into_node(ports))
    }

    /// Check that the API answers; used by the connector
    async fn probe(&self) -> Result<()> {
        self.send(self.request(Method::GET, ""), "probe API server")
            .await?
            .ok_or_else(|| Error::connection("API server root returned 404"))?;
        Ok(())
    }
}

/// Map a non-success, non-404 status to an error
pub fn status_error(status: StatusCode, what: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid token or insufficient permissions. Status: {}",
            what, status
        )),
        404 => Error::not_found(what.to_string()),
        409 => Error::already_exists(format!("{}: {}", what, body)),
        500..=599 => Error::repository(
            BACKEND,
            format!("{}: controller server error: {} - {}", what, status, body),
        ),
        _ => Error::repository(BACKEND, format!("{}: {} - {}", what, status, body)),
    }
}

async fn parse_json(response: Response, what: &str) -> Result<Value> {
    response
        .json()
        .await
        .map_err(|e| Error::repository(BACKEND, format!("{}: failed to parse response: {}", what, e)))
}

#[async_trait]
impl FabricRepository for VncRepository {
    async fn read_project(&self, uuid: &str) -> Result<Option<Project>> {
        Ok(self
            .read::<WireIdentity>(ObjectType::Project, uuid)
            .await?
            .map(Project::from))
    }

    async fn read_tag(&self, fq_name: &FqName) -> Result<Option<Tag>> {
        self.read_by_name::<WireTag>(ObjectType::Tag, fq_name).await
    }

    async fn create_tag(&self, tag: &Tag) -> Result<()> {
        self.create(ObjectType::Tag, &tag.uuid, tag).await
    }

    async fn list_networks(&self) -> Result<Vec<VirtualNetwork>> {
        self.list::<WireVirtualNetwork>(ObjectType::VirtualNetwork)
            .await?
            .into_iter()
            .map(VirtualNetwork::try_from)
            .collect()
    }

    async fn read_network(&self, uuid: &str) -> Result<Option<VirtualNetwork>> {
        self.read::<WireVirtualNetwork>(ObjectType::VirtualNetwork, uuid)
            .await?
            .map(VirtualNetwork::try_from)
            .transpose()
    }

    async fn create_network(&self, network: &VirtualNetwork) -> Result<()> {
        self.create(
            ObjectType::VirtualNetwork,
            &network.uuid,
            &WireVirtualNetwork::from(network),
        )
        .await
    }

    async fn update_network(&self, network: &VirtualNetwork) -> Result<()> {
        self.update(
            ObjectType::VirtualNetwork,
            &network.uuid,
            &WireVirtualNetwork::from(network),
        )
        .await
    }

    async fn delete_network(&self, uuid: &str) -> Result<()> {
        self.delete(ObjectType::VirtualNetwork, uuid).await
    }

    async fn read_ipam(&self, fq_name: &FqName) -> Result<Option<NetworkIpam>> {
        Ok(self
            .read_by_name::<WireNetworkIpam>(ObjectType::NetworkIpam, fq_name)
            .await?
            .map(NetworkIpam::from))
    }

    async fn create_ipam(&self, ipam: &NetworkIpam) -> Result<()> {
        self.create(ObjectType::NetworkIpam, &ipam.uuid, &WireNetworkIpam::from(ipam))
            .await
    }

    async fn list_port_groups(&self) -> Result<Vec<VirtualPortGroup>> {
        Ok(self
            .list::<WireVirtualPortGroup>(ObjectType::VirtualPortGroup)
            .await?
            .into_iter()
            .map(VirtualPortGroup::from)
            .collect())
    }

    async fn read_port_group(&self, uuid: &str) -> Result<Option<VirtualPortGroup>> {
        Ok(self
            .read::<WireVirtualPortGroup>(ObjectType::VirtualPortGroup, uuid)
            .await?
            .map(VirtualPortGroup::from))
    }

    async fn create_port_group(&self, group: &VirtualPortGroup) -> Result<()> {
        self.create(
            ObjectType::VirtualPortGroup,
            &group.uuid,
            &WireVirtualPortGroup::from(group),
        )
        .await
    }

    async fn update_port_group(&self, group: &VirtualPortGroup) -> Result<()> {
        self.update(
            ObjectType::VirtualPortGroup,
            &group.uuid,
            &WireVirtualPortGroup::from(group),
        )
        .await
    }

    async fn delete_port_group(&self, uuid: &str) -> Result<()> {
        self.delete(ObjectType::VirtualPortGroup, uuid).await
    }

    async fn list_interfaces(&self) -> Result<Vec<VirtualMachineInterface>> {
        Ok(self
            .list::<WireVirtualMachineInterface>(ObjectType::VirtualMachineInterface)
            .await?
            .into_iter()
            .map(VirtualMachineInterface::from)
            .collect())
    }

    async fn read_interface(&self, uuid: &str) -> Result<Option<VirtualMachineInterface>> {
        Ok(self
            .read::<WireVirtualMachineInterface>(ObjectType::VirtualMachineInterface, uuid)
            .await?
            .map(VirtualMachineInterface::from))
    }

    async fn create_interface(&self, interface: &VirtualMachineInterface) -> Result<()> {
        self.create(
            ObjectType::VirtualMachineInterface,
            &interface.uuid,
            &WireVirtualMachineInterface::from(interface),
        )
        .await
    }

    async fn update_interface(&self, interface: &VirtualMachineInterface) -> Result<()> {
        self.update(
            ObjectType::VirtualMachineInterface,
            &interface.uuid,
            &WireVirtualMachineInterface::from(interface),
        )
        .await
    }

    async fn delete_interface(&self, uuid: &str) -> Result<()> {
        self.delete(ObjectType::VirtualMachineInterface, uuid).await
    }

    async fn list_logical_routers(&self) -> Result<Vec<LogicalRouter>> {
        Ok(self
            .list::<WireLogicalRouter>(ObjectType::LogicalRouter)
            .await?
            .into_iter()
            .map(LogicalRouter::from)
            .collect())
    }

    async fn read_logical_router(&self, uuid: &str) -> Result<Option<LogicalRouter>> {
        Ok(self
            .read::<WireLogicalRouter>(ObjectType::LogicalRouter, uuid)
            .await?
            .map(LogicalRouter::from))
    }

    async fn create_logical_router(&self, router: &LogicalRouter) -> Result<()> {
        self.create(
            ObjectType::LogicalRouter,
            &router.uuid,
            &WireLogicalRouter::from(router),
        )
        .await
    }

    async fn update_logical_router(&self, router: &LogicalRouter) -> Result<()> {
        self.update(
            ObjectType::LogicalRouter,
            &router.uuid,
            &WireLogicalRouter::from(router),
        )
        .await
    }

    async fn delete_logical_router(&self, uuid: &str) -> Result<()> {
        self.delete(ObjectType::LogicalRouter, uuid).await
    }

    async fn list_physical_routers(&self) -> Result<Vec<PhysicalRouter>> {
        Ok(self
            .list::<WirePhysicalRouter>(ObjectType::PhysicalRouter)
            .await?
            .into_iter()
            .map(PhysicalRouter::from)
            .collect())
    }

    async fn read_fabric(&self, uuid: &str) -> Result<Option<Fabric>> {
        Ok(self
            .read::<WireIdentity>(ObjectType::Fabric, uuid)
            .await?
            .map(Fabric::from))
    }

    /// Listed nodes carry no ports; [`read_node`](Self::read_node) fills them
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self
            .list::<WireNode>(ObjectType::Node)
            .await?
            .into_iter()
            .map(|node| node.into_node(Vec::new()))
            .collect())
    }

    async fn read_node(&self, name: &str) -> Result<Option<Node>> {
        let fq_name = vec![GLOBAL_SYSTEM_CONFIG.to_string(), name.to_string()];
        match self.read_by_name::<WireNode>(ObjectType::Node, &fq_name).await? {
            Some(node) => Ok(Some(self.expand_node(node).await?)),
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Connector for the controller API
///
/// Every `connect` builds a fresh client and probes the API root, so a
/// failed attempt can simply be repeated.
#[derive(Debug, Clone)]
pub struct VncConnector {
    settings: VncSettings,
}

impl VncConnector {
    pub fn new(settings: VncSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl FabricConnector for VncConnector {
    async fn connect(&self) -> Result<Arc<dyn FabricRepository>> {
        let repo = VncRepository::new(self.settings.clone())?;
        repo.probe().await?;
        info!(
            "Connected to fabric controller at {} [mode: {}]",
            self.settings.api_url,
            if self.settings.dry_run { "DRY-RUN" } else { "LIVE" }
        );
        Ok(Arc::new(repo))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for creating controller connectors
pub struct VncConnectorFactory;

impl FabricConnectorFactory for VncConnectorFactory {
    fn create(&self, config: &FabricConfig) -> Result<Box<dyn FabricConnector>> {
        match config {
            FabricConfig::Vnc {
                api_url,
                auth_token,
                timeout_secs,
                dry_run,
            } => {
                config.validate()?;
                if *dry_run {
                    tracing::warn!(
                        "Fabric controller backend running in DRY-RUN mode - no changes will be made"
                    );
                }

                let mut settings = VncSettings::new(api_url.clone())
                    .with_timeout(Duration::from_secs(*timeout_secs))
                    .with_dry_run(*dry_run);
                if let Some(token) = auth_token.as_ref().filter(|t| !t.is_empty()) {
                    settings = settings.with_token(token.clone());
                }
                Ok(Box::new(VncConnector::new(settings)))
            }
            _ => Err(Error::config("Invalid config for the vnc fabric backend")),
        }
    }
}

/// Register the controller backend under the `vnc` type name
///
/// # Example
///
/// ```rust
/// use fabric_sync_core::BackendRegistry;
///
/// let registry = BackendRegistry::with_builtin();
/// fabric_sync_vnc::register(&registry);
/// assert!(registry.has_fabric("vnc"));
/// ```
pub fn register(registry: &BackendRegistry) {
    registry.register_fabric(BACKEND, Box::new(VncConnectorFactory));
}
