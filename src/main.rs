use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use purger::ObjectStoreBackupWriter;
use router::{ServiceState, create_router};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "bucketdb")]
#[command(about = "bucketdb - daily time-series buckets with backup-before-delete purging")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<BucketDbCommands>,
}

#[derive(Subcommand)]
enum BucketDbCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for BucketDbCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    // Handle commands that don't start the server
    let command = cli.command.unwrap_or_default();
    let BucketDbCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config)? {
        return Ok(());
    }

    utils::validate_config(&config)?;
    let tz = config.timezone().context("Invalid time zone")?;
    let addr = config.listen_addr().context("Invalid listen address")?;

    tracing::info!("Loaded configuration:");
    tracing::info!("  Database DSN: {}", config.database.dsn);
    tracing::info!("  Backup DSN: {} (prefix '{}')", config.backup.dsn, config.backup.prefix);
    tracing::info!("  Time zone: {tz}");

    let store = common::store::connect(&config.database)
        .await
        .context("Failed to open bucket store")?;

    let object_store = common::storage::create_object_store(&config.backup)
        .context("Failed to initialize backup object store")?;
    let backup = Arc::new(ObjectStoreBackupWriter::new(
        object_store,
        config.backup.prefix.clone(),
    ));

    let app = create_router(ServiceState::new(store.clone(), backup, tz));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("HTTP server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down, closing bucket store");
    store.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c signal: {e}");
        std::future::pending::<()>().await;
    }
}
