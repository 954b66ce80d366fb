//! Daemon entrypoint (spec §6): loads settings, wires the concrete
//! adapters (Postgres, Telegram, content-addressed storage, IOC scanner)
//! into a [`Pipeline`], serves `/health` and `/metrics`, and shuts down
//! cooperatively on `SIGINT`/`SIGTERM`.

use anyhow::{Context, Result};
use ingestor_cas::ContentStore;
use ingestor_config::Settings;
use ingestor_ioc::{IocScanner, Policy};
use ingestor_pipeline::Pipeline;
use ingestor_remote::{RemoteSource, TelegramSource};
use ingestor_repository::{PostgresRepository, Repository};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// How often the scratch janitor sweeps for orphaned directories (spec
/// §9 resolution #3).
const SCRATCH_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
/// Scratch entries older than this are assumed orphaned by a crashed job.
const SCRATCH_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

#[tokio::main]
async fn main() -> Result<()> {
    ingestor_config::logging::init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "ingestord exiting after startup failure");
        std::process::exit(1);
    }

    Ok(())
}

async fn run() -> Result<()> {
    let settings = Settings::from_env().context("loading configuration")?;

    let postgres = PostgresRepository::connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;
    let repository: Arc<dyn Repository> = Arc::new(postgres.clone());

    let store = ContentStore::new(&settings.storage_path).context("opening content store")?;

    let session_path = settings.storage_path.join(format!("{}.session", settings.remote_phone));
    let remote: Arc<dyn RemoteSource> = Arc::new(TelegramSource::new(
        settings.remote_api_id,
        settings.remote_api_hash.clone(),
        session_path,
        settings.max_file_size_bytes(),
    ));
    remote.connect().await.context("connecting to telegram")?;
    let channel_ids = remote
        .resolve_channels(&settings.remote_channels)
        .await
        .context("resolving configured channels")?;

    let policy = Policy::new(
        settings.ioc_domains.clone(),
        settings.ioc_emails.clone(),
        settings.ioc_ipv4_cidrs.clone(),
    );
    let scanner = IocScanner::new(policy).context("compiling ioc scan policy")?;

    let pipeline = Arc::new(Pipeline::new(
        remote.clone(),
        repository,
        store.clone(),
        scanner,
        settings.worker_count,
    ));

    let shutdown = CancellationToken::new();

    let http_shutdown = shutdown.clone();
    let http_metrics = pipeline.metrics();
    let http_server = tokio::spawn(async move {
        let app = ingestor_http::router(http_metrics);
        let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await
    });

    let janitor_shutdown = shutdown.clone();
    let janitor_store = store.clone();
    let janitor = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SCRATCH_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match janitor_store.purge_scratch_older_than(SCRATCH_MAX_AGE) {
                        Ok(removed) if removed > 0 => {
                            tracing::info!(removed, "swept orphaned scratch directories");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "scratch sweep failed"),
                    }
                }
                () = janitor_shutdown.cancelled() => break,
            }
        }
    });

    let pipeline_task = {
        let pipeline = pipeline.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { pipeline.run(channel_ids, shutdown).await })
    };

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    let _ = pipeline_task.await;
    let _ = janitor.await;
    if let Ok(Err(e)) = http_server.await {
        tracing::warn!(error = %e, "http server exited with an error");
    }

    remote.disconnect().await.context("disconnecting from telegram")?;
    postgres.close().await;

    tracing::info!("ingestord shut down cleanly");
    Ok(())
}
