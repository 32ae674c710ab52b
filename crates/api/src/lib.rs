//! HTTP API for partner purchase orders.
//!
//! Provides REST endpoints for orders and partner credit, with idempotent
//! order creation, structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod middleware;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use common::{Money, Partner, PartnerId};
use domain::{CreditCache, CreditLedger, OrderService};
use idempotency::{IdempotencyGuard, IdempotencyStore};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{OrderStore, PartnerStore, StoreError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use config::Config;

/// Identifier of the partner seeded for local runs.
pub const DEMO_PARTNER_ID: Uuid = Uuid::from_u128(0x1ffe19fd_cb50_4afe_b4cf_07aa691631df);

/// Shared application state accessible from all handlers.
pub struct AppState<P, O> {
    pub orders: OrderService<P, O>,
}

/// Builds the order service over the given stores.
pub fn build_state<P, O>(partners: P, orders: O, config: &Config) -> Arc<AppState<P, O>>
where
    P: PartnerStore,
    O: OrderStore,
{
    let ledger = CreditLedger::new(partners)
        .with_lock_timeout(config.partner_lock_timeout)
        .with_cache(CreditCache::new(config.credit_cache_ttl));

    Arc::new(AppState {
        orders: OrderService::new(ledger, orders),
    })
}

/// Creates the Axum application router with all routes and shared state.
///
/// Only `POST /v1/orders` passes through the idempotency middleware.
pub fn create_app<P, O, I>(
    state: Arc<AppState<P, O>>,
    guard: IdempotencyGuard<I>,
    metrics_handle: PrometheusHandle,
    storage: &'static str,
) -> Router
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
    I: IdempotencyStore + Clone + 'static,
{
    use routes::{orders, partners};

    let idempotent = axum::middleware::from_fn_with_state(guard, middleware::idempotency::<I>);

    let api = Router::new()
        .route(
            "/v1/orders",
            post(orders::create::<P, O>)
                .route_layer(idempotent)
                .get(orders::search::<P, O>),
        )
        .route(
            "/v1/orders/{id}",
            get(orders::get::<P, O>).delete(orders::cancel::<P, O>),
        )
        .route("/v1/orders/{id}/status", patch(orders::update_status::<P, O>))
        .route("/v1/partners/{id}/credit", get(partners::credit::<P, O>))
        .route(
            "/v1/partners/{id}/credit-limit",
            put(partners::update_credit_limit::<P, O>),
        )
        .with_state(state);

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    let health_router = Router::new()
        .route("/health", get(routes::health::check))
        .with_state(storage);

    api.merge(metrics_router)
        .merge(health_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the demo partner (limit 10,000.00, fully available) if missing.
pub async fn seed_demo_partner<P: PartnerStore>(partners: &P) -> Result<Partner, StoreError> {
    let id = PartnerId::from_uuid(DEMO_PARTNER_ID);
    if let Some(existing) = partners.find_by_id(id).await? {
        return Ok(existing);
    }

    let partner = Partner::new(
        "PARTNER-001",
        "Demo Partner",
        "partner@example.com",
        Money::from_cents(1_000_000),
    )
    .with_id(id);
    let saved = partners.save(partner).await?;
    tracing::info!(partner_id = %saved.id, code = %saved.code, "seeded demo partner");
    Ok(saved)
}
