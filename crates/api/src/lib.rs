//! HTTP API for the order saga orchestrator.
//!
//! Exposes saga triggers, participant callbacks and queries as REST
//! endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use event_store::{InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use order_saga::{HttpParticipant, InMemoryParticipant, SagaCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;
use routes::sagas::{AppState, SharedParticipant, SharedStore};

/// Extra time the HTTP client waits beyond the notifier's per-call timeout,
/// so a slow participant is reported as a timeout rather than a transport
/// error.
const HTTP_CLIENT_GRACE: Duration = Duration::from_secs(1);

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/sagas", post(routes::sagas::start))
        .route("/sagas/{id}", get(routes::sagas::get))
        .route("/sagas/{id}/events", get(routes::sagas::events))
        .route("/sagas/{id}/complete", post(routes::sagas::complete))
        .route("/sagas/{id}/compensate", post(routes::sagas::compensate))
        .route("/sagas/{id}/{leg}/success", post(routes::sagas::leg_success))
        .route("/sagas/{id}/{leg}/failure", post(routes::sagas::leg_failure))
        .route(
            "/sagas/{id}/{leg}/compensated",
            post(routes::sagas::leg_compensated),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state from explicit parts.
pub fn create_state(
    store: SharedStore,
    shipment: SharedParticipant,
    invoice: SharedParticipant,
    config: &Config,
) -> Arc<AppState> {
    let coordinator =
        SagaCoordinator::with_options(store, shipment, invoice, config.coordinator_options());
    Arc::new(AppState { coordinator })
}

/// Creates state backed by an in-memory store and in-memory participants.
pub fn create_default_state() -> Arc<AppState> {
    create_state(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryParticipant::new()),
        Arc::new(InMemoryParticipant::new()),
        &Config::default(),
    )
}

/// Wires the store and participant clients selected by `config`.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, StartupError> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            tracing::info!("using PostgreSQL event store");
            Arc::new(PostgresEventStore::connect(url, 10).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory");
            Arc::new(InMemoryEventStore::new())
        }
    };

    let shipment = participant("shipment", config.shipment_url.as_deref(), config)?;
    let invoice = participant("invoice", config.invoice_url.as_deref(), config)?;

    Ok(create_state(store, shipment, invoice, config))
}

fn participant(
    name: &str,
    base_url: Option<&str>,
    config: &Config,
) -> Result<SharedParticipant, StartupError> {
    match base_url {
        Some(url) => {
            tracing::info!(participant = name, %url, "using HTTP participant");
            let client_timeout = config.notify_timeout + HTTP_CLIENT_GRACE;
            Ok(Arc::new(HttpParticipant::new(url, client_timeout)?))
        }
        None => {
            tracing::warn!(participant = name, "no URL configured, using in-memory participant");
            Ok(Arc::new(InMemoryParticipant::new()))
        }
    }
}
