//! JSON endpoints

use axum::{
    Json,
    extract::{Query, State},
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::collectors::platform::shell::run_command;
use crate::run::command::resolve_binary;
use crate::run::{RunAccepted, RunRequest, StatusReport};
use crate::web::error::AppError;
use crate::web::router::AppState;

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const HOSTNAME_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub iface: Option<String>,
}

pub async fn run_iperf(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<Value>, AppError> {
    let RunAccepted { run_id, cmd, logfile } = state.controller.start(request).await.map_err(|e| {
        warn!("Rejected start request: {}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "status": "iperf3 started",
        "run_id": run_id,
        "cmd": cmd,
        "logfile": logfile,
    })))
}

pub async fn stop_iperf(State(state): State<AppState>) -> Json<Value> {
    let stopped = state.controller.stop().await;
    info!("Stop requested (process running: {})", stopped);
    Json(json!({ "stopped": stopped }))
}

pub async fn api_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<StatusReport> {
    Json(state.controller.status(query.iface.as_deref()).await)
}

pub async fn api_interfaces(State(state): State<AppState>) -> Json<Value> {
    let interfaces = state.controller.query().list_interfaces().await;
    Json(json!({ "interfaces": interfaces }))
}

/// First line of `iperf3 -v` plus the host name
pub async fn iperf_version(State(state): State<AppState>) -> Json<Value> {
    let binary = resolve_binary(&state.controller.settings().load());
    let binary = binary.to_string_lossy().into_owned();

    let version = match run_command(&[binary.as_str(), "-v"], VERSION_TIMEOUT).await {
        Ok(out) => out.output.lines().next().unwrap_or("unknown").to_string(),
        Err(e) => e.to_string(),
    };
    let host = match run_command(&["hostname"], HOSTNAME_TIMEOUT).await {
        Ok(out) => out.output,
        Err(e) => e.to_string(),
    };

    Json(json!({ "version": format!("{version} client running on: {host}") }))
}
