//! Deterministic identity mapping
//!
//! Downstream objects that aggregate several upstream resources have no
//! upstream id of their own. Their identity is a composite key built from
//! stable upstream attributes, hashed into a name-based UUID:
//!
//! ```text
//! vpg#<host>                 one port group per host
//! vpg#<host>#<physnet>       one port group per host and physical network
//! vmi#<network>#<host>       one interface per network and host
//! lrvmi#<network>#<router>   router interface name (uuid = upstream port id)
//! ```
//!
//! Attributes may not contain the separator, so the attribute count of a key
//! is always its separator count. The same key hashes to the same UUID in
//! every process.

use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Separator between key prefix and attributes
pub const KEY_SEPARATOR: char = '#';

const PORT_GROUP_PREFIX: &str = "vpg";
const INTERFACE_PREFIX: &str = "vmi";
const ROUTER_INTERFACE_PREFIX: &str = "lrvmi";

/// Build a composite key from a kind prefix and attributes
pub fn make_key(prefix: &str, attributes: &[&str]) -> Result<String> {
    let mut key = String::from(prefix);
    for attribute in attributes {
        check_attribute(attribute)?;
        key.push(KEY_SEPARATOR);
        key.push_str(attribute);
    }
    Ok(key)
}

/// Split a key built by [`make_key`] back into its attributes
///
/// Returns `None` when the prefix differs or the attribute count is not
/// `arity`.
pub fn parse_key(prefix: &str, arity: usize, key: &str) -> Option<Vec<String>> {
    let mut parts = key.split(KEY_SEPARATOR);
    if parts.next()? != prefix {
        return None;
    }
    let attributes: Vec<String> = parts.map(String::from).collect();
    if attributes.len() != arity || attributes.iter().any(|a| a.is_empty()) {
        return None;
    }
    Some(attributes)
}

/// Name-based UUID of a key
pub fn make_id(key: &str) -> String {
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, key.as_bytes()).to_string()
}

/// Downstream project uuid of an upstream tenant id
///
/// Tenant ids are UUIDs, usually written without dashes.
pub fn project_id(tenant_id: &str) -> Result<String> {
    Uuid::parse_str(tenant_id)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|e| Error::validation(format!("Invalid tenant id '{}': {}", tenant_id, e)))
}

fn check_attribute(attribute: &str) -> Result<()> {
    if attribute.is_empty() {
        return Err(Error::validation("Key attribute cannot be empty"));
    }
    if attribute.contains(KEY_SEPARATOR) {
        return Err(Error::validation(format!(
            "Key attribute '{}' contains '{}'",
            attribute, KEY_SEPARATOR
        )));
    }
    Ok(())
}

/// Identity of an aggregation group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortGroupKey {
    /// All links of a host
    Host { host: String },
    /// Links of a host labelled with one physical network
    PhysicalNetwork { host: String, physnet: String },
}

impl PortGroupKey {
    pub fn host(host: &str) -> Result<Self> {
        check_attribute(host)?;
        Ok(Self::Host {
            host: host.to_string(),
        })
    }

    pub fn physical_network(host: &str, physnet: &str) -> Result<Self> {
        check_attribute(host)?;
        check_attribute(physnet)?;
        Ok(Self::PhysicalNetwork {
            host: host.to_string(),
            physnet: physnet.to_string(),
        })
    }

    /// Recover a key from a group name; `None` for names we did not build
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(mut attrs) = parse_key(PORT_GROUP_PREFIX, 1, name) {
            return Some(Self::Host {
                host: attrs.remove(0),
            });
        }
        let mut attrs = parse_key(PORT_GROUP_PREFIX, 2, name)?;
        let physnet = attrs.remove(1);
        let host = attrs.remove(0);
        Some(Self::PhysicalNetwork { host, physnet })
    }

    pub fn host_name(&self) -> &str {
        match self {
            Self::Host { host } | Self::PhysicalNetwork { host, .. } => host,
        }
    }

    pub fn physnet(&self) -> Option<&str> {
        match self {
            Self::Host { .. } => None,
            Self::PhysicalNetwork { physnet, .. } => Some(physnet),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Host { host } => join(PORT_GROUP_PREFIX, &[host]),
            Self::PhysicalNetwork { host, physnet } => join(PORT_GROUP_PREFIX, &[host, physnet]),
        }
    }

    pub fn id(&self) -> String {
        make_id(&self.name())
    }
}

impl fmt::Display for PortGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Identity of the interface connecting one network to one host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceKey {
    pub network_id: String,
    pub host: String,
}

impl InterfaceKey {
    pub fn new(network_id: &str, host: &str) -> Result<Self> {
        check_attribute(network_id)?;
        check_attribute(host)?;
        Ok(Self {
            network_id: network_id.to_string(),
            host: host.to_string(),
        })
    }

    pub fn parse(name: &str) -> Option<Self> {
        let mut attrs = parse_key(INTERFACE_PREFIX, 2, name)?;
        let host = attrs.remove(1);
        let network_id = attrs.remove(0);
        Some(Self { network_id, host })
    }

    pub fn name(&self) -> String {
        join(INTERFACE_PREFIX, &[&self.network_id, &self.host])
    }

    pub fn id(&self) -> String {
        make_id(&self.name())
    }
}

impl fmt::Display for InterfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Name of the interface connecting a network to a logical router
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouterInterfaceKey {
    pub network_id: String,
    pub router_id: String,
}

impl RouterInterfaceKey {
    pub fn new(network_id: &str, router_id: &str) -> Result<Self> {
        check_attribute(network_id)?;
        check_attribute(router_id)?;
        Ok(Self {
            network_id: network_id.to_string(),
            router_id: router_id.to_string(),
        })
    }

    pub fn parse(name: &str) -> Option<Self> {
        let mut attrs = parse_key(ROUTER_INTERFACE_PREFIX, 2, name)?;
        let router_id = attrs.remove(1);
        let network_id = attrs.remove(0);
        Some(Self {
            network_id,
            router_id,
        })
    }

    pub fn name(&self) -> String {
        join(ROUTER_INTERFACE_PREFIX, &[&self.network_id, &self.router_id])
    }
}

fn join<S: AsRef<str>>(prefix: &str, attributes: &[S]) -> String {
    let mut key = String::from(prefix);
    for attribute in attributes {
        key.push(KEY_SEPARATOR);
        key.push_str(attribute.as_ref());
    }
    key
}
