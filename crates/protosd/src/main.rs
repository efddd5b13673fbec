// # protosd - Protos Resource Provider Daemon
//
// Thin integration layer: all protocol logic lives in protos-core, the
// transport in protos-ws. The daemon:
//
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Registers the app as provider of one resource type
// 4. Runs the event loop until SIGTERM/SIGINT or a fatal error
// 5. Deregisters the provider
//
// ## Configuration
//
// - `APPID`: App identity token (required)
// - `PROTOS_URL`: Base URL of the host API (default `http://protos:8080/internal/`)
// - `PROTOS_RESOURCE_TYPE`: Resource type to provide (default `dns`)
// - `PROTOS_POLL_INTERVAL`: Seconds between reconciliations (default 30)
// - `PROTOS_HTTP_TIMEOUT`: REST timeout in seconds (default 30)
// - `PROTOS_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ## Example
//
// ```bash
// export APPID=4f3c2a...
// export PROTOS_URL=http://protos:8080/internal/
// export PROTOS_RESOURCE_TYPE=dns
//
// protosd
// ```

use anyhow::{Context, Result};
use protos_core::handlers::BoxFuture;
use protos_core::{
    APP_ID_ENV_VAR, Event, EventHandler, EventKind, EventLoop, HandlerRegistry, HandlerResult,
    ProtosClient, ProtosConfig, Resource, ResourceStatus, Update,
};
use protos_ws::WsConnector;
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_URL: &str = "http://protos:8080/internal/";
const DEFAULT_RESOURCE_TYPE: &str = "dns";

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtosExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ProtosExitCode> for ExitCode {
    fn from(code: ProtosExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    app_id: String,
    url: String,
    resource_type: String,
    poll_interval_secs: u64,
    http_timeout_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parse_secs = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a number of seconds. Got: {}", key, raw)),
                None => Ok(default),
            }
        };

        Ok(Self {
            app_id: lookup(APP_ID_ENV_VAR)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .with_context(|| {
                    format!(
                        "{} is required. Set it via: export {}=your_app_id",
                        APP_ID_ENV_VAR, APP_ID_ENV_VAR
                    )
                })?,
            url: lookup("PROTOS_URL").unwrap_or_else(|| DEFAULT_URL.to_string()),
            resource_type: lookup("PROTOS_RESOURCE_TYPE")
                .unwrap_or_else(|| DEFAULT_RESOURCE_TYPE.to_string()),
            poll_interval_secs: parse_secs("PROTOS_POLL_INTERVAL", 30)?,
            http_timeout_secs: parse_secs("PROTOS_HTTP_TIMEOUT", 30)?,
            log_level: lookup("PROTOS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            anyhow::bail!(
                "PROTOS_URL must use the http or https scheme. Got: {}",
                self.url
            );
        }

        if self.resource_type.is_empty()
            || !self
                .resource_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "PROTOS_RESOURCE_TYPE '{}' is not a valid resource type",
                self.resource_type
            );
        }

        if !(1..=86_400).contains(&self.poll_interval_secs) {
            anyhow::bail!(
                "PROTOS_POLL_INTERVAL must be between 1 and 86400 seconds. Got: {}",
                self.poll_interval_secs
            );
        }

        if !(1..=300).contains(&self.http_timeout_secs) {
            anyhow::bail!(
                "PROTOS_HTTP_TIMEOUT must be between 1 and 300 seconds. Got: {}",
                self.http_timeout_secs
            );
        }

        parse_level(&self.log_level)?;
        Ok(())
    }

    fn protos_config(&self) -> ProtosConfig {
        let mut config = ProtosConfig::new(&self.url, &self.app_id)
            .with_poll_interval_secs(self.poll_interval_secs);
        config.http_timeout_secs = self.http_timeout_secs;
        config
    }
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "PROTOS_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ProtosExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ProtosExitCode::ConfigError.into();
    }

    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ProtosExitCode::ConfigError.into();
    }

    info!("Starting protosd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ProtosExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon until the session ends
async fn run_daemon(config: Config) -> ProtosExitCode {
    let protos = config.protos_config();

    let client = match ProtosClient::new(&protos) {
        Ok(client) => client,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ProtosExitCode::ConfigError;
        }
    };

    if let Err(e) = client.register_provider(&config.resource_type).await {
        error!("Provider registration failed: {}", e);
        return ProtosExitCode::RuntimeError;
    }

    let result = run_session(&protos, client.clone()).await;

    // Best effort
    if let Err(e) = client.deregister_provider(&config.resource_type).await {
        warn!("Provider deregistration failed: {}", e);
    }

    match result {
        Ok(()) => {
            info!("Shut down cleanly");
            ProtosExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {:#}", e);
            ProtosExitCode::RuntimeError
        }
    }
}

async fn run_session(protos: &ProtosConfig, client: ProtosClient) -> Result<()> {
    match client.get_app_info().await {
        Ok(app) => info!("Running as app {}", app.name),
        Err(e) => warn!("Could not fetch app info: {}", e),
    }

    let reconciler = Reconciler { client };

    let mut handlers = HandlerRegistry::new();
    handlers.register_handler(EventKind::Timer, reconciler.clone())?;
    handlers.register_handler(EventKind::NewMessage, reconciler)?;
    handlers.register(EventKind::Terminate, |_event: Event| async {
        info!("Notification session terminated");
        Ok(())
    })?;

    let (event_loop, mut states) =
        EventLoop::new(protos, Box::new(WsConnector::new()), handlers)?;

    let monitor = tokio::spawn(async move {
        while let Some(state) = states.recv().await {
            debug!("Session state: {:?}", state);
        }
    });

    let result = event_loop.run(protos.poll_interval()).await;
    monitor.abort();

    Ok(result?)
}

/// Marks requested resources as created
///
/// Handles both the periodic full reconciliation and per-resource updates.
#[derive(Clone)]
struct Reconciler {
    client: ProtosClient,
}

impl Reconciler {
    /// Fulfil every resource still in the `requested` state
    async fn reconcile_all(&self) -> HandlerResult {
        let resources = self
            .client
            .get_resources()
            .await
            .context("listing provider resources")?;

        let requested: Vec<&Resource> = resources
            .values()
            .filter(|resource| resource.status == ResourceStatus::Requested)
            .collect();

        if requested.is_empty() {
            debug!("{} resource(s), none requested", resources.len());
            return Ok(());
        }

        info!("Fulfilling {} requested resource(s)", requested.len());
        self.client
            .set_status_batch(requested, ResourceStatus::Created)
            .await?;
        Ok(())
    }

    async fn reconcile_update(&self, update: Update) -> HandlerResult {
        let Some(resource) = update.resource() else {
            info!("Received update: {}", update.to_json());
            return Ok(());
        };

        info!(
            "Received update for {} resource {} ({})",
            resource.resource_type(),
            resource.id,
            resource.status
        );

        if resource.status == ResourceStatus::Requested {
            self.client
                .set_resource_status(&resource.id, ResourceStatus::Created)
                .await
                .with_context(|| format!("fulfilling resource {}", resource.id))?;
        }
        Ok(())
    }
}

impl EventHandler for Reconciler {
    fn call(&self, event: Event) -> BoxFuture<'static, HandlerResult> {
        let this = self.clone();
        Box::pin(async move {
            match event {
                Event::Timer => this.reconcile_all().await,
                Event::NewMessage(update) => this.reconcile_update(update).await,
                Event::Terminate => Ok(()),
            }
        })
    }
}
