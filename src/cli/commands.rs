//! CLI command implementations
//!
//! `serve` wires one replica server to an in-process broker and runs it
//! until Ctrl-C. The other commands are one-shot and print a single JSON
//! response.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::batch::{BatchExecutor, JobRegistry};
use crate::bitarchive::BitarchiveServer;
use crate::channels::{ChannelRegistry, Replica, ReplicaType};
use crate::checksum::{ChecksumCatalog, ChecksumServer, ChecksumServerSettings};
use crate::config::BitvaultConfig;
use crate::connection::ConnectionManager;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::server::{ReplicaServer, ServerRegistry};
use crate::transfer::{FileTransfer, LocalTransfer};
use crate::transport::{Broker, LocalBroker};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Dispatch a parsed command
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::CheckConfig { config } => check_config(&config),
        Command::Catalog { config, filename } => catalog(&config, filename.as_deref()),
    }
}

fn load_config(path: &Path) -> CliResult<BitvaultConfig> {
    let config = BitvaultConfig::load(path)?;
    let replicas = config.replicas.len().to_string();
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("environment", config.environment.as_str()),
            ("replicas", replicas.as_str()),
        ],
    );
    Ok(config)
}

/// Validate a configuration file
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    write_response(describe_config(&config))
}

fn describe_config(config: &BitvaultConfig) -> Value {
    let replicas: Vec<Value> = config
        .replica_list()
        .iter()
        .map(|r| json!({"id": r.id, "name": r.name, "type": r.replica_type.as_str()}))
        .collect();
    json!({
        "valid": true,
        "environment": config.environment,
        "replicas": replicas,
        "this_replica": config.this_replica,
    })
}

/// Print the checksum catalog, or one entry of it
pub fn catalog(config_path: &Path, filename: Option<&str>) -> CliResult<()> {
    let config = load_config(config_path)?;
    write_response(catalog_entries(&config, filename)?)
}

fn catalog_entries(config: &BitvaultConfig, filename: Option<&str>) -> CliResult<Value> {
    let catalog = ChecksumCatalog::load(&config.checksum_file)?;
    match filename {
        Some(filename) => {
            let checksum = catalog.get(filename).ok_or_else(|| {
                CliError::not_found(format!("No checksum recorded for {}", filename))
            })?;
            Ok(json!({"filename": filename, "checksum": checksum}))
        }
        None => {
            let entries: Vec<String> = catalog.entries().map(|e| e.to_line()).collect();
            Ok(json!({"count": entries.len(), "entries": entries}))
        }
    }
}

/// Serve the configured replica until Ctrl-C
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let replica = config
        .served_replica()
        .ok_or_else(|| CliError::config_error("this_replica must name the replica to serve"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve_replica(config, replica))
}

async fn serve_replica(config: BitvaultConfig, replica: Replica) -> CliResult<()> {
    let metrics = Arc::new(MetricsRegistry::new());
    let instance = Uuid::new_v4().simple().to_string().to_uppercase();
    let registry = ChannelRegistry::new(&config.environment, instance, config.replica_list())
        .map_err(CliError::boot_failed)?;
    let broker: Arc<dyn Broker> = Arc::new(LocalBroker::new());

    let connection =
        ConnectionManager::connect(broker, registry, config.retry_policy(), Arc::clone(&metrics))
            .await
            .map_err(CliError::boot_failed)?;
    let server = build_server(&config, &replica, Arc::clone(&metrics))?;

    let servers = ServerRegistry::new(Arc::clone(&connection));
    servers.start(server).await.map_err(CliError::boot_failed)?;
    log_event_with_fields(
        Event::Serving,
        &[
            ("replica", replica.id.as_str()),
            ("type", replica.replica_type.as_str()),
        ],
    );

    tokio::signal::ctrl_c().await?;

    servers.stop_all().await.map_err(CliError::boot_failed)?;
    connection.close().await;
    write_response(json!({
        "served": replica.id,
        "metrics": serde_json::to_value(metrics.snapshot())?,
    }))
}

/// The server matching the replica's type
fn build_server(
    config: &BitvaultConfig,
    replica: &Replica,
    metrics: Arc<MetricsRegistry>,
) -> CliResult<Arc<dyn ReplicaServer>> {
    let transfer: Arc<dyn FileTransfer> = Arc::new(LocalTransfer::new(&config.transfer_dir));
    let server: Arc<dyn ReplicaServer> = match replica.replica_type {
        ReplicaType::Checksum => Arc::new(
            ChecksumServer::new(
                replica.clone(),
                &config.checksum_file,
                transfer,
                ChecksumServerSettings {
                    credentials: config.credentials.clone(),
                    use_precomputed_checksum: config.use_precomputed_checksum_during_upload,
                },
                metrics,
            )
            .map_err(CliError::boot_failed)?,
        ),
        ReplicaType::Bitarchive => {
            let executor = BatchExecutor::new(
                Arc::new(JobRegistry::with_builtin_jobs()),
                config.batch_timeout(),
            );
            Arc::new(
                BitarchiveServer::new(
                    replica.clone(),
                    &config.bitarchive_dir,
                    transfer,
                    executor,
                    config.credentials.clone(),
                    metrics,
                )
                .map_err(CliError::boot_failed)?,
            )
        }
    };
    Ok(server)
}
