// ABOUTME: Entry point for the kvd binary.
// ABOUTME: Wires config, the transaction log, startup replay, and the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use kvd_core::KeyValueStore;
use kvd_log::{FileTransactionLog, SqliteTransactionLog, TransactionLog, replay_into_store};
use kvd_server::{AppState, KvdConfig, LogBackend, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvd=debug,tower_http=debug".parse().unwrap()),
        )
        .init();

    let config = KvdConfig::from_env().context("invalid configuration")?;

    let mut log: Box<dyn TransactionLog> = match config.backend {
        LogBackend::File => {
            tracing::info!("opening file transaction log at {}", config.log_file.display());
            Box::new(
                FileTransactionLog::open(&config.log_file)
                    .context("cannot open transaction log file")?,
            )
        }
        LogBackend::Sqlite => {
            tracing::info!("opening sqlite transaction log at {}", config.db_path.display());
            Box::new(
                SqliteTransactionLog::open(&config.db_path)
                    .context("cannot open transaction log database")?,
            )
        }
    };

    // Replay must finish before the writer starts: both sides share the
    // backing medium and the replayed high-water mark seeds new writes.
    let store = KeyValueStore::new();
    let replayed = replay_into_store(log.as_mut(), &store)
        .await
        .context("transaction log replay failed")?;
    tracing::info!("restored {replayed} events, {} keys live", store.len().await);

    log.run().context("cannot start transaction log writer")?;

    if let Some(error_rx) = log.err() {
        tokio::spawn(async move {
            if let Ok(err) = error_rx.await {
                tracing::error!("transaction log writer failed: {err}");
            }
        });
    }

    let state = Arc::new(AppState::new(store, Arc::from(log)));
    let router = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.bind))?;
    tracing::info!("kvd listening on {}", config.bind);
    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}
