//! Astron Replica command line
//!
//! Connects to a cluster in the client or internal role with a schema file,
//! then logs repository events until interrupted or disconnected.

use anyhow::Context;
use astron_replica::core::config::Config;
use astron_replica::core::logging::init_logging;
use astron_replica::object::ClassRegistry;
use astron_replica::repository::{
    ClientRepository, EventStream, InternalRepository, RepositoryHandle,
};
use astron_replica::schema::SchemaRepository;
use clap::{Arg, Command};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("astron-replica")
        .version(astron_replica::VERSION)
        .about("Replicate distributed objects from an Astron cluster.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("schema")
                .short('s')
                .long("schema")
                .value_name("FILE")
                .required(true)
                .help("Schema declaration file (.toml or .json)"),
        )
        .arg(
            Arg::new("role")
                .long("role")
                .value_name("ROLE")
                .value_parser(["client", "internal"])
                .default_value("client")
                .help("Protocol role"),
        )
        .arg(
            Arg::new("addr")
                .long("addr")
                .value_name("ADDR")
                .help("Cluster address as host:port"),
        )
        .arg(
            Arg::new("version-string")
                .long("version-string")
                .value_name("VERSION")
                .help("Version string sent in the client hello"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .get_matches();

    // Load configuration
    let config_path = matches.get_one::<String>("config").map(Path::new);
    let mut config = Config::load_from(config_path).context("loading configuration")?;
    apply_cli_overrides(&mut config, &matches);
    config.validate().context("validating configuration")?;

    init_logging(&config.logging)?;
    info!("Starting {} v{}", astron_replica::NAME, astron_replica::VERSION);

    let schema_path = matches
        .get_one::<String>("schema")
        .context("missing --schema")?;
    let schema = SchemaRepository::from_file(schema_path)
        .with_context(|| format!("loading schema {}", schema_path))?;
    info!(
        classes = schema.classes().count(),
        fields = schema.field_count(),
        hash = schema.hash(),
        "schema loaded"
    );
    let schema = Arc::new(schema);

    let role = matches
        .get_one::<String>("role")
        .map(String::as_str)
        .unwrap_or("client");
    let handle: RepositoryHandle = match role {
        "internal" => InternalRepository::connect(&config, schema, ClassRegistry::new())
            .await
            .context("connecting to message director")?
            .handle()
            .clone(),
        _ => ClientRepository::connect(&config, schema, ClassRegistry::new())
            .await
            .context("connecting to client agent")?
            .handle()
            .clone(),
    };
    info!(role, address = %config.network.server_address, "connected");

    let events = handle.subscribe();
    tokio::select! {
        _ = log_events(events) => {}
        _ = handle.closed() => {
            warn!("repository closed");
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, closing repository...");
            handle.close().await;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Apply command line argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, matches: &clap::ArgMatches) {
    if let Some(addr) = matches.get_one::<String>("addr") {
        config.network.server_address = addr.clone();
    }

    if let Some(version) = matches.get_one::<String>("version-string") {
        config.client.version = version.clone();
    }

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
}

async fn log_events(mut events: EventStream) {
    while let Some(event) = events.next().await {
        info!(?event, "repository event");
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
