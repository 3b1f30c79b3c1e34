use anyhow::Context;
use clap::Parser;
use pkg_constants::api::{DEFAULT_API_SERVER, DEFAULT_NAMESPACE};
use pkg_constants::controller::{
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WATCHDOG_INTERVAL_SECS, EVENT_CHANNEL_CAPACITY,
    FULL_RESYNC_EVERY,
};
use pkg_constants::paths::{
    DEFAULT_OPERATOR_CONFIG, SERVICE_ACCOUNT_CA, SERVICE_ACCOUNT_NAMESPACE, SERVICE_ACCOUNT_TOKEN,
};
use pkg_controllers::{MongoShellInitiator, PlatformDetector, Reconciler};
use pkg_state::{Api, ApiClient, ObjectStore, TopologyWatcher};
use pkg_types::config::{LogFormat, OperatorConfigFile, load_config_file};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Default)]
#[command(
    name = "psmdb-operator",
    about = "Percona Server for MongoDB replica-set operator"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_OPERATOR_CONFIG)]
    config: String,

    /// API server URL
    #[arg(long)]
    server: Option<String>,

    /// Bearer token for the API server
    #[arg(long)]
    token: Option<String>,

    /// Namespace whose topologies are managed
    #[arg(long, short)]
    namespace: Option<String>,

    /// PEM bundle of the CA that signed the API server certificate
    #[arg(long)]
    ca_file: Option<String>,

    /// Seconds between topology list passes
    #[arg(long)]
    resync_interval_secs: Option<u64>,

    /// Seconds between watchdog polls
    #[arg(long)]
    watchdog_interval_secs: Option<u64>,

    /// Log output: text or json
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Skip TLS certificate verification of the API server
    #[arg(long, default_value_t = false)]
    insecure: bool,
}

/// Credentials mounted into the pod when running in-cluster.
#[derive(Debug, Default)]
struct ServiceAccount {
    token: Option<String>,
    namespace: Option<String>,
    ca_file: Option<String>,
}

impl ServiceAccount {
    fn load() -> Self {
        Self {
            token: read_trimmed(SERVICE_ACCOUNT_TOKEN),
            namespace: read_trimmed(SERVICE_ACCOUNT_NAMESPACE),
            ca_file: std::path::Path::new(SERVICE_ACCOUNT_CA)
                .exists()
                .then(|| SERVICE_ACCOUNT_CA.to_string()),
        }
    }
}

fn read_trimmed(path: &str) -> Option<String> {
    let value = std::fs::read_to_string(path).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, PartialEq)]
struct Settings {
    server: String,
    token: Option<String>,
    namespace: String,
    ca_file: Option<String>,
    resync_interval: Duration,
    watchdog_interval: Duration,
    log_format: LogFormat,
}

// Merge: CLI args > config file > service account > defaults
fn resolve_settings(cli: &Cli, file_cfg: OperatorConfigFile, sa: ServiceAccount) -> Settings {
    Settings {
        server: cli
            .server
            .clone()
            .or(file_cfg.server)
            .unwrap_or_else(|| DEFAULT_API_SERVER.to_string()),
        token: cli.token.clone().or(file_cfg.token).or(sa.token),
        namespace: cli
            .namespace
            .clone()
            .or(file_cfg.namespace)
            .or(sa.namespace)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        ca_file: cli.ca_file.clone().or(file_cfg.ca_file).or(sa.ca_file),
        resync_interval: Duration::from_secs(
            cli.resync_interval_secs
                .or(file_cfg.resync_interval_secs)
                .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS)
                .max(1),
        ),
        watchdog_interval: Duration::from_secs(
            cli.watchdog_interval_secs
                .or(file_cfg.watchdog_interval_secs)
                .unwrap_or(DEFAULT_WATCHDOG_INTERVAL_SECS)
                .max(1),
        ),
        log_format: cli.log_format.or(file_cfg.log_format).unwrap_or_default(),
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: OperatorConfigFile = load_config_file(&cli.config)?;
    let settings = resolve_settings(&cli, file_cfg, ServiceAccount::load());
    init_logging(settings.log_format);

    info!("Config file: {}", cli.config);
    info!("Starting psmdb-operator");
    info!("  Server:    {}", settings.server);
    info!("  Namespace: {}", settings.namespace);
    info!("  Resync:    {}s", settings.resync_interval.as_secs());
    info!("  Watchdog:  {}s", settings.watchdog_interval.as_secs());
    match &settings.token {
        Some(token) => info!("  Token:     {}***", token.chars().take(4).collect::<String>()),
        None => warn!("  Token:     none, requests are unauthenticated"),
    }

    let ca_pem = match &settings.ca_file {
        Some(path) => {
            info!("  CA bundle: {}", path);
            Some(std::fs::read(path).with_context(|| format!("reading CA bundle {}", path))?)
        }
        None => None,
    };
    let client = ApiClient::new(
        &settings.server,
        settings.token.clone(),
        ca_pem.as_deref(),
        cli.insecure,
    )?;
    let platform = PlatformDetector::new(client.clone())
        .resolve_or_default()
        .await;

    let store: Arc<dyn ObjectStore> = Arc::new(client.clone());
    let initiator = Arc::new(MongoShellInitiator::new(client));
    let (reconciler, resync_rx) = Reconciler::new(
        store.clone(),
        platform,
        initiator,
        settings.watchdog_interval,
        EVENT_CHANNEL_CAPACITY,
    );
    let reconciler = Arc::new(reconciler);

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let watcher = TopologyWatcher::new(
        Api::namespaced(store, &settings.namespace),
        settings.resync_interval,
        FULL_RESYNC_EVERY,
    )
    .start(event_tx);
    let mut run = tokio::spawn(reconciler.clone().run(event_rx, resync_rx));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Received shutdown signal");
        }
        res = &mut run => {
            res?;
            warn!("Reconciler exited unexpectedly");
        }
    }

    watcher.abort();
    reconciler.shutdown().await;
    info!("psmdb-operator stopped");
    Ok(())
}
