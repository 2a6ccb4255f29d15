use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::state::AppState;
use crate::domain::Order;

/// Body of `GET /api/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Open sockets, active or not
    pub raw_connection_count: usize,
    /// Branded agents active within the liveness window
    pub connection_count: usize,
    pub current_order: String,
    pub history: Vec<Order>,
    pub brand_usage: BTreeMap<String, usize>,
    /// Server time in unix milliseconds
    pub date: i64,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let liveness = state.registry.liveness().await;
    let snapshot = state.history.snapshot().await;

    Json(StatsResponse {
        raw_connection_count: state.registry.raw_count().await,
        connection_count: liveness.connection_count,
        current_order: snapshot.current_map.clone(),
        history: snapshot.map_history.clone(),
        brand_usage: liveness.brand_usage,
        date: Utc::now().timestamp_millis(),
    })
}
