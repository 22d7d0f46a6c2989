use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chore_escrow::api::{self, AppState};
use chore_escrow::config::{Config, StorageBackend};
use chore_escrow::db;
use chore_escrow::jobs;
use chore_escrow::services::approval::ApprovalCoordinator;
use chore_escrow::services::ledger::WalletLedger;
use chore_escrow::services::notifier::{LogNotifier, Notifier, WebhookNotifier};
use chore_escrow::store::{EscrowStore, MemoryLedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chore_escrow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chore escrow server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(backend = ?config.storage_backend, "Configuration loaded successfully");

    match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_ref()
                .context("database_url is required for the postgres storage backend")?;

            let pool = db::create_pool(database_url).await?;
            tracing::info!("Database pool created");

            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations completed");

            serve(config, Arc::new(PgLedgerStore::new(pool))).await
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on shutdown");
            serve(config, Arc::new(MemoryLedgerStore::new())).await
        }
    }
}

async fn serve<S: EscrowStore>(config: Config, store: Arc<S>) -> anyhow::Result<()> {
    let notifier: Arc<dyn Notifier> = match &config.notification_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering notifications by webhook");
            Arc::new(WebhookNotifier::new(
                url.clone(),
                config.notification_webhook_secret.clone(),
            ))
        }
        None => Arc::new(LogNotifier),
    };

    let ledger = WalletLedger::new(store.clone(), config.deposit_limits(), config.currency.clone());
    let coordinator =
        ApprovalCoordinator::new(store.clone(), ledger, notifier, config.approval_limits());

    // Keep the scheduler alive for the lifetime of the server
    let _audit_scheduler = match &config.ledger_audit_schedule {
        Some(schedule) => Some(jobs::start_scheduler(store.clone(), schedule).await?),
        None => {
            tracing::info!("Ledger audit disabled");
            None
        }
    };

    let app = api::app(AppState::new(coordinator));

    let host: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid host '{}'", config.host))?;
    let addr = SocketAddr::from((host, config.port));
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
