//! Service entrypoint: configuration, telemetry, database migrations, the
//! background dispatcher and the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use migration::MigratorTrait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use resident_sync::config::ConfigLoader;
use resident_sync::crypto::CredentialKey;
use resident_sync::dispatcher::Dispatcher;
use resident_sync::orchestrator::EventOrchestrator;
use resident_sync::repositories::credential::DefaultCredentials;
use resident_sync::sink::client::SinkClient;
use resident_sync::source::aggregator::SnapshotFetcher;
use resident_sync::source::client::SourceClient;
use resident_sync::{db, server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(ConfigLoader::new().load().context("loading configuration")?);
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    info!(
        config = %config.redacted_json().unwrap_or_else(|_| "<unserializable>".to_string()),
        "starting resident-sync"
    );

    let pool = db::init_pool(&config).await.context("initializing database pool")?;
    migration::Migrator::up(&pool, None)
        .await
        .context("running database migrations")?;

    let credential_key = match &config.credential_key {
        Some(bytes) => Some(CredentialKey::new(bytes.clone()).context("loading credential key")?),
        None => None,
    };
    let default_creds = match (&config.source_default_username, &config.source_default_password) {
        (Some(username), Some(password)) => Some(DefaultCredentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    let source = SourceClient::new(&config.source_api_base)
        .map_err(|e| anyhow::anyhow!("building source client: {e}"))?;
    let sink = SinkClient::new(&config.sink)
        .map_err(|e| anyhow::anyhow!("building sink client: {e}"))?;
    let orchestrator = EventOrchestrator::new(SnapshotFetcher::new(source), sink);

    let dispatcher = Dispatcher::new(
        Arc::new(pool.clone()),
        orchestrator,
        config.dispatch.clone(),
        credential_key,
        default_creds,
    );

    let shutdown = CancellationToken::new();

    let dispatcher_shutdown = shutdown.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_shutdown).await;
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    let result = server::run_server(config, pool, shutdown.clone()).await;

    shutdown.cancel();
    let _ = dispatcher_handle.await;

    result
}
