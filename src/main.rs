//! sqlgate - Two-Tier SQL Request Gateway
//!
//! Runs either the public gatekeeper or the internal proxy, plus a few
//! operator commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlgate::config::GatewayConfig;
use sqlgate::error::{Error, Result};
use sqlgate::executor::MySqlExecutor;
use sqlgate::gatekeeper::{resolve_proxy_url, GatekeeperServer};
use sqlgate::lb::{LoadBalancerRouter, ProbeMode};
use sqlgate::probe::build_probe;
use sqlgate::proxy::{ProxyServer, QueryHandler};
use sqlgate::topology::Topology;

/// sqlgate - Two-Tier SQL Request Gateway
#[derive(Parser)]
#[command(name = "sqlgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "sqlgate.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the public gatekeeper
    Gatekeeper {
        /// Address to listen on (overrides gatekeeper.bind_address)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Start the internal proxy
    Proxy {
        /// Address to listen on (overrides proxy.bind_address)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "sqlgate.toml")]
        output: PathBuf,
    },

    /// Validate configuration and topology files
    Validate,

    /// Show configuration and resolved topology
    Info,

    /// Query the liveness endpoint of a running gateway
    Status {
        /// Gateway address (host:port)
        #[arg(short, long, default_value = "localhost:8080")]
        address: String,
    },

    /// Send one statement through a gatekeeper
    Query {
        /// Gatekeeper address (host:port)
        #[arg(short, long, default_value = "localhost:8080")]
        address: String,

        /// Routing strategy (direct, random, customized)
        #[arg(short, long)]
        strategy: Option<String>,

        /// API token (defaults to gatekeeper.api_token from the config)
        #[arg(short = 'k', long)]
        token: Option<String>,

        /// SQL statement
        sql: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let logging = GatewayConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(cli.log_level.as_deref().unwrap_or(&logging.level), &logging.format);

    match cli.command {
        Commands::Gatekeeper { listen } => run_gatekeeper(cli.config, listen).await,
        Commands::Proxy { listen } => run_proxy(cli.config, listen).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Status { address } => run_status(address).await,
        Commands::Query { address, strategy, token, sql } => {
            run_query(cli.config, address, strategy, token, sql).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(config_path: &Path) -> Result<GatewayConfig> {
    match GatewayConfig::from_file(config_path) {
        Ok(c) => Ok(c),
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            Err(e)
        }
    }
}

/// Run the public gatekeeper
async fn run_gatekeeper(config_path: PathBuf, listen: Option<String>) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(listen) = listen {
        config.gatekeeper.bind_address = listen;
    }

    let topology = match config.gatekeeper.proxy_url {
        Some(_) => None,
        None => Some(Topology::from_file(&config.topology.file)?),
    };
    let proxy_url = resolve_proxy_url(&config, topology.as_ref())?;

    tracing::info!("Starting sqlgate gatekeeper");
    let server = GatekeeperServer::new(&config, proxy_url)?;

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                tracing::error!("Gatekeeper error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}

/// Run the internal proxy
async fn run_proxy(config_path: PathBuf, listen: Option<String>) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(listen) = listen {
        config.proxy.bind_address = listen;
    }

    let topology = match Topology::from_file(&config.topology.file) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to load topology: {}", e);
            return Err(e);
        }
    };
    let registry = Arc::new(topology.registry(config.topology.address)?);

    tracing::info!("Starting sqlgate proxy");
    tracing::info!("Manager: {}", registry.manager());
    tracing::info!("Workers: {:?}", registry.workers());

    let probe_mode = if config.probe.parallel {
        ProbeMode::Parallel { deadline: config.probe_deadline() }
    } else {
        ProbeMode::Sequential
    };
    let router = LoadBalancerRouter::new(registry, build_probe(&config), probe_mode);
    let executor = Arc::new(MySqlExecutor::new(config.database.clone()));
    let server = ProxyServer::new(config.proxy.clone(), QueryHandler::new(router, executor));

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                tracing::error!("Proxy error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!("{} already exists", output.display())));
    }

    let config_content = r#"# sqlgate Configuration
# Generated configuration file

[gatekeeper]
bind_address = "0.0.0.0:8080"
api_token = "changeme"
# proxy_url = "http://10.0.0.11:8080/query"
proxy_port = 8080
request_timeout_secs = 10
cors_enabled = false

[proxy]
bind_address = "0.0.0.0:8080"
cors_enabled = false

[topology]
file = "cluster_info.json"
address = "private"

[database]
port = 3306
user = "root"
password = "changeme"
database = "sakila"
connect_timeout_secs = 2

[probe]
method = "ping"
timeout_ms = 1000
port = 3306
parallel = false
deadline_ms = 3000

[logging]
level = "info"
format = "pretty"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to set the API token and database credentials.");
    println!("Then start with: sqlgate --config {} proxy", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    let config = match GatewayConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            return Err(e);
        }
    };
    println!("✓ Configuration is valid");

    if let Err(e) = config.validate_gatekeeper() {
        println!("  ! Gatekeeper cannot start: {}", e);
    }

    match Topology::from_file(&config.topology.file)
        .and_then(|t| t.registry(config.topology.address))
    {
        Ok(registry) => {
            println!("✓ Topology is valid");
            println!("  Manager: {}", registry.manager());
            println!("  Workers: {}", registry.workers().len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Topology error: {}", e);
            Err(e)
        }
    }
}

/// Show configuration and topology
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = GatewayConfig::from_file(&config_path)?;

    println!("sqlgate Information");
    println!("===================");
    println!();
    println!("Gatekeeper:");
    println!("  Bind Address:   {}", config.gatekeeper.bind_address);
    println!("  Proxy URL:      {}", config.gatekeeper.proxy_url.as_deref().unwrap_or("(from topology)"));
    println!("  Timeout:        {} s", config.gatekeeper.request_timeout_secs);
    println!();
    println!("Proxy:");
    println!("  Bind Address:   {}", config.proxy.bind_address);
    println!("  Database:       {}@*:{}/{}",
        config.database.user,
        config.database.port,
        config.database.database.as_deref().unwrap_or("(none)"));
    println!("  Probe:          {:?} ({} ms, parallel: {})",
        config.probe.method, config.probe.timeout_ms, config.probe.parallel);
    println!();
    println!("Topology ({}):", config.topology.file.display());

    match Topology::from_file(&config.topology.file) {
        Ok(topology) => {
            let kind = config.topology.address;
            println!("  Proxy:          {}", topology.proxy_address(kind).unwrap_or("(none)"));
            match topology.registry(kind) {
                Ok(registry) => {
                    println!("  Manager:        {}", registry.manager());
                    println!("  Workers:        {:?}", registry.workers());
                }
                Err(e) => println!("  Registry:       {}", e),
            }
        }
        Err(e) => println!("  Unavailable:    {}", e),
    }

    Ok(())
}

/// Query gateway status
async fn run_status(address: String) -> Result<()> {
    let url = format!("http://{}/", address);

    match reqwest::get(&url).await {
        Ok(response) => {
            let status: serde_json::Value = response.json().await
                .map_err(|e| Error::Network(e.to_string()))?;
            print_json(&status)
        }
        Err(e) => {
            eprintln!("Failed to get status: {}", e);
            Err(Error::Network(e.to_string()))
        }
    }
}

/// Send one statement through a gatekeeper
async fn run_query(
    config_path: PathBuf,
    address: String,
    strategy: Option<String>,
    token: Option<String>,
    sql: String,
) -> Result<()> {
    let token = match token {
        Some(t) => t,
        None => GatewayConfig::from_file(&config_path)?.gatekeeper.api_token,
    };

    let url = format!("http://{}/query", address);
    let body = sqlgate::api::QueryRequest { query: sql, strategy };

    let response = reqwest::Client::new()
        .post(&url)
        .header(sqlgate::api::API_KEY_HEADER, token)
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    let status = response.status();
    let payload: serde_json::Value = response.json().await
        .map_err(|e| Error::Network(e.to_string()))?;

    println!("HTTP {}", status);
    print_json(&payload)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Network(e.to_string()))?;
    println!("{}", pretty);
    Ok(())
}
