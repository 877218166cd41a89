//! Health check handlers

use crate::{error::ServerResult, server::ServerState};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Basic health check
pub async fn health_check() -> ServerResult<Json<Value>> {
    Ok(Json(json!({
        "status": "ok",
        "service": "zephyr-server",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Readiness check - reports whether the generation worker accepts jobs
pub async fn readiness_check(State(state): State<ServerState>) -> ServerResult<Json<Value>> {
    let worker = state.service.worker();
    let ready = worker.is_accepting();

    Ok(Json(json!({
        "status": if ready { "ready" } else { "not_ready" },
        "service": "zephyr-server",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "checks": {
            "generation_worker": {
                "status": if ready { "ok" } else { "error" },
                "model": worker.model_name(),
                "queued": worker.queued(),
                "queue_capacity": worker.queue_capacity()
            }
        }
    })))
}
