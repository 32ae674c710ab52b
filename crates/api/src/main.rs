//! API server entry point.

use std::time::Duration;

use api::config::{Config, LogFormat};
use idempotency::{InMemoryIdempotencyStore, IdempotencyGuard, PostgresIdempotencyStore};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryOrderStore, InMemoryPartnerStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Periodically deletes expired idempotency keys.
fn spawn_idempotency_purge(store: IdempotencyPurge) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = match &store {
                IdempotencyPurge::Memory(store) => Ok(store.purge_expired().await as u64),
                IdempotencyPurge::Postgres(store) => store.purge_expired().await,
            };
            match purged {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "purged expired idempotency keys"),
                Err(e) => tracing::warn!(error = %e, "failed to purge idempotency keys"),
            }
        }
    });
}

enum IdempotencyPurge {
    Memory(InMemoryIdempotencyStore),
    Postgres(PostgresIdempotencyStore),
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build stores and the application
    let app = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");

            let store = PostgresStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            if config.seed_demo_partner {
                api::seed_demo_partner(&store)
                    .await
                    .expect("failed to seed demo partner");
            }

            let state = api::build_state(store.clone(), store, &config);
            let idempotency = PostgresIdempotencyStore::new(pool);
            spawn_idempotency_purge(IdempotencyPurge::Postgres(idempotency.clone()));
            let guard = IdempotencyGuard::new(idempotency, config.guard_config());
            api::create_app(state, guard, metrics_handle, "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            let partners = InMemoryPartnerStore::new();
            if config.seed_demo_partner {
                api::seed_demo_partner(&partners)
                    .await
                    .expect("failed to seed demo partner");
            }

            let state = api::build_state(partners, InMemoryOrderStore::new(), &config);
            let idempotency = InMemoryIdempotencyStore::new();
            spawn_idempotency_purge(IdempotencyPurge::Memory(idempotency.clone()));
            let guard = IdempotencyGuard::new(idempotency, config.guard_config());
            api::create_app(state, guard, metrics_handle, "memory")
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
