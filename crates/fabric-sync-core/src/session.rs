// # Fabric Session
//
// Lazily established, reused connection to the fabric controller.
//
// The first successful `connect` opens the repository and makes sure the
// ownership tag exists; later calls return the same connection. Concurrent
// callers wait for the one connect in flight. A failed connect leaves the
// session empty so the next caller tries again.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{Error, Result};
use crate::tagger::OwnershipTag;
use crate::traits::{FabricConnector, FabricRepository};

/// Repository handle plus the resolved ownership tag
#[derive(Clone)]
pub struct Connection {
    pub repo: Arc<dyn FabricRepository>,
    pub tag: OwnershipTag,
}

/// Connect-once session
pub struct FabricSession {
    connector: Box<dyn FabricConnector>,
    ownership_value: String,
    connection: OnceCell<Connection>,
}

impl FabricSession {
    pub fn new(connector: Box<dyn FabricConnector>, ownership_value: impl Into<String>) -> Self {
        Self {
            connector,
            ownership_value: ownership_value.into(),
            connection: OnceCell::new(),
        }
    }

    /// Return the live connection, opening it first if needed
    ///
    /// Every failure is reported as [`Error::Connection`] so callers can tell
    /// an unreachable controller from a failed pass.
    pub async fn connect(&self) -> Result<Connection> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let repo = self.connector.connect().await.map_err(as_connection)?;
                let tag = OwnershipTag::ensure(repo.as_ref(), &self.ownership_value)
                    .await
                    .map_err(as_connection)?;
                info!(
                    "Connected to fabric controller ({}), ownership tag {}",
                    self.connector.backend_name(),
                    tag.tag().fq_name.join(":")
                );
                Ok::<_, Error>(Connection { repo, tag })
            })
            .await?;
        Ok(connection.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    pub fn backend_name(&self) -> &'static str {
        self.connector.backend_name()
    }
}

fn as_connection(err: Error) -> Error {
    match err {
        Error::Connection(_) => err,
        other => Error::connection(other.to_string()),
    }
}
