// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::collections::BTreeSet;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use oss_cluster::{ClusterConfig, ClusterManager, MonitorConfig};
use oss_cluster_server::{router, AppState};

/// Timeout of the requests this process sends to the masters
const MASTER_TIMEOUT: Duration = Duration::from_secs(60);

/// Cluster membership and service discovery server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address the HTTP server binds to
    #[arg(long, default_value = "0.0.0.0")]
    listen: IpAddr,
    /// Hostname the other processes reach this one at
    #[arg(long, default_value = "localhost")]
    hostname: String,
    /// Port the HTTP server listens on
    #[arg(long, default_value_t = 9099)]
    port: u16,
    /// Directory holding the cluster configuration
    #[arg(long, default_value = "opensearchserver_cluster")]
    data_dir: PathBuf,
    /// Explicit path of the cluster configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Services this process registers with every master (comma separated)
    #[arg(long, value_delimiter = ',')]
    services: Vec<String>,
    /// Seconds between two health check sweeps
    #[arg(long, default_value_t = 60)]
    monitor_interval_secs: u64,
    /// Seconds before the first health check sweep
    #[arg(long, default_value_t = 10)]
    monitor_delay_secs: u64,
}

// MAIN //
#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // if it's not set, set the log level to info
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::builder().format_timestamp_millis().init();

    let config_path = ClusterConfig::resolve_path(&args.data_dir, args.config.as_deref());
    let config = ClusterConfig::load(&config_path)
        .with_context(|| format!("Loading {}", config_path.display()))?;

    // the check endpoint must answer before the registry is ready
    let state = AppState::new();
    let bind = SocketAddr::new(args.listen, args.port);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Binding {bind}"))?;
    log::info!("Listening on {}", bind);
    let app = router(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let manager = Arc::new(ClusterManager::new(&config, &args.hostname, args.port)?);
    let mut monitor = None;
    if manager.is_master() {
        manager.bootstrap(MASTER_TIMEOUT).await;
        monitor = manager
            .spawn_monitor(MonitorConfig {
                interval: Duration::from_secs(args.monitor_interval_secs.max(1)),
                initial_delay: Duration::from_secs(args.monitor_delay_secs),
            })
            .await?;
    }
    state.initialize(manager.clone());

    let services: BTreeSet<String> = args
        .services
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let masters = manager.master_client(MASTER_TIMEOUT)?;
    manager.register_me(&services, &masters).await;

    tokio::select! {
        served = server => {
            served??;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("CTRL-C pressed, leaving the cluster");
        }
    }

    if !services.is_empty() {
        manager.unregister_me(&masters).await;
    }
    if let Some((monitor, handle)) = monitor {
        monitor.stop(None);
        let _ = handle.await;
    }
    log::info!("Server exiting");
    Ok(())
}
