use clap::{Parser, Subcommand};
use faultline::cli::{banner, RulesCommand};
use faultline::config::{Config, DEFAULT_CONFIG_FILE};
use faultline::control_api::ControlApiServer;
use faultline::proxy::ProxyServer;
use faultline::store::{FileRuleStore, RuleStore, SharedRuleStore};
use faultline::tcp::TcpProxy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "faultline",
    about = "FaultLine: all-in-one failure testing for APIs and databases",
    long_about = "FaultLine helps you build resilient apps by simulating real-world failures across:\n \
                  - API (HTTP) via a reverse proxy with latency/errors/flaky responses\n \
                  - DB (TCP) via a transparent proxy for network-level faults (latency, drops, throttling, refused)\n\n\
                  Configure scenarios in a YAML file and run targeted commands to test each surface."
)]
struct Cli {
    /// Path to the configuration file (default faultline.yaml)
    #[arg(short, long, global = true)]
    config: Option<String>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the API (HTTP) fault-injection proxy and the control API
    StartApi {
        /// Port for the failure injection proxy
        #[arg(short = 'p', long, default_value_t = 8080)]
        proxy_port: u16,
        /// Port for the control panel API
        #[arg(short = 'a', long, default_value_t = 8081)]
        api_port: u16,
    },
    /// Start the DB (TCP) fault-injection proxies from tcpRules
    StartDb,
    /// Manage failure injection rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), anyhow::Error> {
    let config = match cli.config.as_deref() {
        Some(path) => Config::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {path}: {e}"))?,
        None => Config::load_or_default(DEFAULT_CONFIG_FILE)?,
    };

    match cli.command {
        Command::StartApi {
            proxy_port,
            api_port,
        } => start_api(config, proxy_port, api_port).await,
        Command::StartDb => start_db(config).await,
        Command::Rules { command } => {
            faultline::cli::run(command, PathBuf::from(config.rules_file()))
        }
    }
}

async fn start_api(config: Config, proxy_port: u16, api_port: u16) -> Result<(), anyhow::Error> {
    banner::print();
    let store = bootstrap_store(&config);

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut servers: JoinSet<Result<(), anyhow::Error>> = JoinSet::new();

    let proxy = ProxyServer::new(Arc::clone(&store));
    let proxy_addr = SocketAddr::from(([0, 0, 0, 0], proxy_port));
    let shutdown = shutdown_tx.subscribe();
    servers.spawn(async move { proxy.run(proxy_addr, shutdown).await });

    let api = ControlApiServer::new(store);
    let api_addr = SocketAddr::from(([0, 0, 0, 0], api_port));
    let shutdown = shutdown_tx.subscribe();
    servers.spawn(async move { api.run(api_addr, shutdown).await });

    wait_for_shutdown(&mut servers, shutdown_tx).await
}

async fn start_db(config: Config) -> Result<(), anyhow::Error> {
    banner::print();
    if config.tcp_rules.is_empty() {
        info!("no tcpRules found in config, nothing to start");
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut servers: JoinSet<Result<(), anyhow::Error>> = JoinSet::new();

    let count = config.tcp_rules.len();
    for rule in config.tcp_rules {
        let shutdown = shutdown_tx.subscribe();
        servers.spawn(async move { TcpProxy::new(rule).run(shutdown).await });
    }
    info!("started {count} DB network proxies (latency/drops/throttle/refuse)");

    wait_for_shutdown(&mut servers, shutdown_tx).await
}

/// Block until ctrl-c, then broadcast shutdown and join every server.
/// A server finishing before the signal means bootstrap failed; its error
/// propagates into a non-zero exit.
async fn wait_for_shutdown(
    servers: &mut JoinSet<Result<(), anyhow::Error>>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), anyhow::Error> {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(());
        }
        joined = servers.join_next() => {
            let _ = shutdown_tx.send(());
            if let Some(result) = joined {
                result??;
            }
        }
    }
    while let Some(result) = servers.join_next().await {
        result??;
    }
    info!("servers gracefully stopped");
    Ok(())
}

/// Open the persisted rule store. The file, when present, is authoritative;
/// config rules only seed a store that has no file yet.
fn bootstrap_store(config: &Config) -> SharedRuleStore {
    let path = PathBuf::from(config.rules_file());
    let seed_from_config = !path.exists();
    let store = FileRuleStore::new(Some(path));

    if seed_from_config {
        for rule_config in config.rules.iter().cloned() {
            store.add(rule_config.into_rule());
        }
        if !config.rules.is_empty() {
            info!(count = config.rules.len(), "seeded rules from config");
        }
    } else if !config.rules.is_empty() {
        debug!(
            count = config.rules.len(),
            "persisted rule file present, ignoring config rules"
        );
    }

    Arc::new(store)
}
