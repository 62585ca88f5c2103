// # fabric-syncd - Fabric Sync Daemon
//
// Thin integration layer: all reconciliation logic lives in fabric-sync-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering the fabric and intent store backends
// 4. Running the periodic reconciliation loop until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Fabric controller
// - `FABRIC_SYNC_FABRIC_TYPE`: vnc (default), file, memory
// - `FABRIC_SYNC_FABRIC_API_URL`: API server URL (for vnc)
// - `FABRIC_SYNC_FABRIC_AUTH_TOKEN`: Bearer token (optional, for vnc)
// - `FABRIC_SYNC_FABRIC_TIMEOUT_SECS`: HTTP timeout (default 30)
// - `FABRIC_SYNC_FABRIC_PATH`: Snapshot path (for file)
// - `FABRIC_SYNC_MODE`: set to `dry-run` to log controller mutations only
//
// ### Intent store
// - `FABRIC_SYNC_INTENT_TYPE`: neutron (default), file, memory
// - `FABRIC_SYNC_INTENT_ENDPOINT`: Networking API URL (for neutron)
// - `FABRIC_SYNC_INTENT_AUTH_TOKEN`: Keystone token (for neutron)
// - `FABRIC_SYNC_INTENT_TIMEOUT_SECS`: HTTP timeout (default 30)
// - `FABRIC_SYNC_INTENT_PATH`: Snapshot path (for file)
//
// ### Reconciler
// - `FABRIC_SYNC_PERIOD`: Sync period, e.g. `1h`, `30m`, `3600` (default 1h)
// - `FABRIC_SYNC_PROVIDER_NAME`: Router flavor provider handled by this system
// - `FABRIC_SYNC_OWNERSHIP_TAG`: Value of the `label=` ownership tag (default __ML2__)
// - `FABRIC_SYNC_GATEWAY_ROLES`: Comma-separated overlay roles of gateway routers
// - `FABRIC_SYNC_MANAGEMENT_PORT_TAGS`: Comma-separated tags of management node ports
// - `FABRIC_SYNC_LOCK_FILE`: Host-wide lock file (optional)
//
// ### Daemon
// - `FABRIC_SYNC_LOG_LEVEL`: trace, debug, info (default), warn, error
// - `FABRIC_SYNC_SHUTDOWN_TIMEOUT_SECS`: Grace period before a forced stop (default 30)
//
// ## Example
//
// ```bash
// export FABRIC_SYNC_FABRIC_API_URL=http://10.0.0.10:8082
// export FABRIC_SYNC_INTENT_ENDPOINT=http://10.0.0.20:9696
// export FABRIC_SYNC_INTENT_AUTH_TOKEN=...
// export FABRIC_SYNC_PERIOD=1h
//
// fabric-syncd
// ```

use anyhow::{Context, Result};
use fabric_sync_core::config::{FabricConfig, IntentStoreConfig, ReconcilerConfig, SyncConfig};
use fabric_sync_core::lock::SYNC_LOCK_NAME;
use fabric_sync_core::traits::IntentStore;
use fabric_sync_core::{
    BackendRegistry, FabricSession, PeriodicScheduler, ReconcileEvent, Reconciler, SyncLock,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const ENV_PREFIX: &str = "FABRIC_SYNC_";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncdExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyncdExitCode> for ExitCode {
    fn from(code: SyncdExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
#[derive(Debug)]
struct Config {
    sync: SyncConfig,
    log_level: String,
    shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which receives full variable names
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |name: &str, default: u64| -> Result<u64> {
            match var(name) {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("{}{} must be a number, got '{}'", ENV_PREFIX, name, value)),
                None => Ok(default),
            }
        };
        let list = |name: &str| -> Option<Vec<String>> {
            var(name).map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
        };

        let fabric = match var("FABRIC_TYPE").as_deref().unwrap_or("vnc") {
            "vnc" => FabricConfig::Vnc {
                api_url: var("FABRIC_API_URL").with_context(|| {
                    format!(
                        "{}FABRIC_API_URL is required when {}FABRIC_TYPE=vnc",
                        ENV_PREFIX, ENV_PREFIX
                    )
                })?,
                auth_token: var("FABRIC_AUTH_TOKEN"),
                timeout_secs: number("FABRIC_TIMEOUT_SECS", 30)?,
                dry_run: var("MODE").is_some_and(|m| m.eq_ignore_ascii_case("dry-run")),
            },
            "file" => FabricConfig::File {
                path: var("FABRIC_PATH").with_context(|| {
                    format!(
                        "{}FABRIC_PATH is required when {}FABRIC_TYPE=file",
                        ENV_PREFIX, ENV_PREFIX
                    )
                })?,
            },
            "memory" => FabricConfig::Memory,
            other => anyhow::bail!(
                "{}FABRIC_TYPE '{}' is not supported. Supported types: vnc, file, memory",
                ENV_PREFIX,
                other
            ),
        };

        let intent_store = match var("INTENT_TYPE").as_deref().unwrap_or("neutron") {
            "neutron" => IntentStoreConfig::Neutron {
                endpoint: var("INTENT_ENDPOINT").with_context(|| {
                    format!(
                        "{}INTENT_ENDPOINT is required when {}INTENT_TYPE=neutron",
                        ENV_PREFIX, ENV_PREFIX
                    )
                })?,
                auth_token: var("INTENT_AUTH_TOKEN").with_context(|| {
                    format!(
                        "{}INTENT_AUTH_TOKEN is required when {}INTENT_TYPE=neutron",
                        ENV_PREFIX, ENV_PREFIX
                    )
                })?,
                timeout_secs: number("INTENT_TIMEOUT_SECS", 30)?,
            },
            "file" => IntentStoreConfig::File {
                path: var("INTENT_PATH").with_context(|| {
                    format!(
                        "{}INTENT_PATH is required when {}INTENT_TYPE=file",
                        ENV_PREFIX, ENV_PREFIX
                    )
                })?,
            },
            "memory" => IntentStoreConfig::Memory,
            other => anyhow::bail!(
                "{}INTENT_TYPE '{}' is not supported. Supported types: neutron, file, memory",
                ENV_PREFIX,
                other
            ),
        };

        let mut reconciler = ReconcilerConfig::default();
        if let Some(period) = var("PERIOD") {
            reconciler.sync_period = period;
        }
        if let Some(provider) = var("PROVIDER_NAME") {
            reconciler.provider_name = provider;
        }
        if let Some(tag) = var("OWNERSHIP_TAG") {
            reconciler.ownership_tag = tag;
        }
        if let Some(roles) = list("GATEWAY_ROLES") {
            reconciler.gateway_roles = roles;
        }
        if let Some(tags) = list("MANAGEMENT_PORT_TAGS") {
            reconciler.management_port_tags = tags;
        }
        reconciler.lock_file = var("LOCK_FILE");

        Ok(Self {
            sync: SyncConfig {
                fabric,
                intent_store,
                reconciler,
            },
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            shutdown_timeout: Duration::from_secs(number("SHUTDOWN_TIMEOUT_SECS", 30)?),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        if let FabricConfig::Vnc {
            auth_token: Some(token),
            ..
        } = &self.sync.fabric
        {
            check_placeholder("FABRIC_AUTH_TOKEN", token)?;
        }
        if let IntentStoreConfig::Neutron { auth_token, .. } = &self.sync.intent_store {
            check_placeholder("INTENT_AUTH_TOKEN", auth_token)?;
        }

        parse_log_level(&self.log_level)?;

        if self.shutdown_timeout.is_zero() {
            anyhow::bail!("{}SHUTDOWN_TIMEOUT_SECS must be > 0", ENV_PREFIX);
        }

        Ok(())
    }
}

/// Reject obvious placeholder tokens (a common mistake)
fn check_placeholder(name: &str, token: &str) -> Result<()> {
    let lower = token.to_lowercase();
    if lower.contains("your_token") || lower.contains("replace_me") || lower == "token" {
        anyhow::bail!(
            "{}{} appears to be a placeholder. Use an actual token.",
            ENV_PREFIX,
            name
        );
    }
    Ok(())
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "{}LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            ENV_PREFIX,
            level
        ),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SyncdExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SyncdExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncdExitCode::ConfigError.into();
    }

    info!("Starting fabric-syncd");
    info!(
        "Fabric backend: {}, intent store: {}, period: {}",
        config.sync.fabric.type_name(),
        config.sync.intent_store.type_name(),
        config.sync.reconciler.sync_period
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncdExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            SyncdExitCode::RuntimeError
        } else {
            SyncdExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Build the backends from the registry
fn build_registry() -> BackendRegistry {
    let registry = BackendRegistry::with_builtin();

    #[cfg(feature = "vnc")]
    {
        info!("Registering fabric controller backend");
        fabric_sync_vnc::register(&registry);
    }

    #[cfg(feature = "neutron")]
    {
        info!("Registering networking API intent store");
        fabric_sync_neutron::register(&registry);
    }

    registry
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = build_registry();
    let policy = config.sync.reconciler.clone();

    let connector = registry
        .create_connector(&config.sync.fabric)
        .context("Failed to create fabric connector")?;
    let intent: Arc<dyn IntentStore> = Arc::from(
        registry
            .create_intent_store(&config.sync.intent_store)
            .context("Failed to create intent store")?,
    );

    let session = Arc::new(FabricSession::new(connector, policy.ownership_tag.clone()));

    let mut lock = SyncLock::new(SYNC_LOCK_NAME);
    if let Some(path) = &policy.lock_file {
        lock = lock.with_file(path);
    }

    let period = policy.period()?;
    let (reconciler, events) = Reconciler::new(session, intent, policy, lock)?;
    let events_task = tokio::spawn(log_events(events));

    let mut scheduler = PeriodicScheduler::new(Arc::new(reconciler), period);
    scheduler.start()?;
    info!("Daemon initialized successfully");

    let signal = wait_for_shutdown_signal().await?;
    info!("Received shutdown signal: {}", signal);

    scheduler.stop(true);
    match tokio::time::timeout(config.shutdown_timeout, scheduler.wait()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                "Periodic sync did not stop within {:?}, forcing shutdown",
                config.shutdown_timeout
            );
            scheduler.stop(false);
            scheduler.wait().await?;
        }
    }

    // The scheduler held the last reconciler handle, so the channel is closed now
    drop(scheduler);
    if let Err(e) = events_task.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    info!("Shutting down daemon");
    Ok(())
}

/// Drain reconcile events into the log
async fn log_events(mut events: mpsc::Receiver<ReconcileEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ReconcileEvent::ItemFailed {
                kind,
                key,
                operation,
                error,
            } => debug!("{} {} of {} failed: {}", kind, operation, key, error),
            ReconcileEvent::ConnectionFailed { error } => {
                debug!("Fabric connection failed: {}", error)
            }
            other => debug!("Reconcile event: {:?}", other),
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
