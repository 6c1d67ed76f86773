use crate::proxy::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use offline_cache::{Coordinator, StoreStats};
use serde::Serialize;
use std::sync::Arc;

/// Combined state for the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub app: Arc<AppState>,
    pub prometheus: Option<PrometheusHandle>,
}

/// One coordinator version as seen from the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct VersionMetrics {
    pub store: String,
    pub state: String,
    pub max_items: usize,
    pub hit_rate: f64,
    pub stats: StoreStats,
}

impl VersionMetrics {
    fn from_coordinator(coordinator: &Coordinator) -> Self {
        let stats = coordinator.stats();
        let total = stats.hits + stats.misses;
        VersionMetrics {
            store: coordinator.store_name().to_string(),
            state: coordinator.state().to_string(),
            max_items: coordinator.config().max_items,
            hit_rate: if total > 0 {
                stats.hits as f64 / total as f64
            } else {
                0.0
            },
            stats,
        }
    }
}

/// Admin listener: JSON stats and Prometheus text.
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/api/stats", get(stats_handler))
        .route("/metrics", get(prometheus_handler))
        .with_state(state)
}

/// GET /api/stats: active and waiting versions plus every store name.
pub async fn stats_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let registration = &state.app.registration;
    let active = registration
        .active()
        .map(|c| VersionMetrics::from_coordinator(&c));
    let waiting = registration
        .waiting()
        .map(|c| VersionMetrics::from_coordinator(&c));

    Json(serde_json::json!({
        "active": active,
        "waiting": waiting,
        "stores": registration.storage().keys(),
    }))
}

/// GET /metrics: Prometheus exposition.
pub async fn prometheus_handler(State(state): State<AdminState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}
