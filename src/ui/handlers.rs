//! HTTP API handlers

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::session::StatisticsSnapshot;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// System status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub udp_port: u16,
    pub sample_rate: u32,
    pub buffer_capacity: usize,
    pub recording: bool,
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let session = state.session.config();
    let status = SystemStatus {
        mode: "receiver".to_string(),
        started_at: state.started_at,
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        udp_port: state.udp_port,
        sample_rate: session.sample_rate,
        buffer_capacity: session.buffer_capacity,
        recording: state.recording,
    };

    Json(ApiResponse::ok(status))
}

/// Get a fresh statistics snapshot
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatisticsSnapshot>> {
    Json(ApiResponse::ok(state.session.statistics_snapshot()))
}

/// Zero all counters
pub async fn reset_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<()>> {
    state.session.reset_statistics();
    tracing::info!("Statistics reset via API");
    Json(ApiResponse::ok(()))
}
