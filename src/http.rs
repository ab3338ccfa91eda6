use axum::{Router, http::StatusCode, middleware, routing::get};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::api::{actuator, diagnostics, items};
use crate::config::{AppInfo, HttpSettings};
use crate::metrics::{Metrics, track_metrics};
use crate::repo::ItemRepository;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn ItemRepository>,
    pub metrics: Arc<Metrics>,
    pub app: Arc<AppInfo>,
}

impl AppState {
    pub fn new(repo: Arc<dyn ItemRepository>, app: AppInfo) -> anyhow::Result<Self> {
        Ok(Self {
            repo,
            metrics: Arc::new(Metrics::new()?),
            app: Arc::new(app),
        })
    }
}

pub fn build_router(state: AppState, http: &HttpSettings) -> Router {
    Router::new()
        // ===== operational =====
        .route("/healthz", get(actuator::liveness))
        .route("/actuator/health", get(actuator::health))
        .route("/actuator/health/liveness", get(actuator::liveness))
        .route("/actuator/health/readiness", get(actuator::readiness))
        .route("/actuator/info", get(actuator::info))
        .route("/actuator/prometheus", get(actuator::prometheus))
        // ===== items =====
        .route("/api/items", get(items::get_all).post(items::create))
        .route("/api/items/create", get(items::create_with_get))
        .route("/api/items/search", get(items::search_by_name))
        .route("/api/items/info", get(diagnostics::connection_info))
        .route(
            "/api/items/:id",
            get(items::get_by_id)
                .put(items::update)
                .delete(items::delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            http.request_timeout,
        ))
        .layer(ConcurrencyLimitLayer::new(http.max_concurrency))
        .with_state(state)
}
