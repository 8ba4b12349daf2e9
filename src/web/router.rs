use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::run::RunController;
use crate::web::{handlers, stream};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RunController>,
}

pub fn create_router(controller: Arc<RunController>) -> Router {
    let state = AppState { controller };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/interfaces", get(handlers::api_interfaces))
        .route("/api/stats", get(handlers::api_stats))
        .route("/iperf_version", get(handlers::iperf_version))
        .route("/run_iperf", post(handlers::run_iperf))
        .route("/stop_iperf", post(handlers::stop_iperf))
        .route("/stream_iperf", get(stream::stream_iperf))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
