use std::sync::Arc;

use axum::extract::{Query, State as AxumState};
use axum::Json;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::snapshot::{market_snapshot, MarketSnapshot};
use crate::State;

#[derive(Debug, Deserialize)]
pub struct SnapshotParams {
    #[serde(default)]
    pub include_orders: bool,
}

/// Export the live market state as JSON (spec §6 egress snapshot).
#[utoipa::path(
    get,
    path = "/api/market/snapshot",
    params(("include_orders" = Option<bool>, Query, description = "Include per-order detail in each level")),
    responses((status = 200, description = "Live market snapshot", body = serde_json::Value)),
    tag = "market"
)]
#[instrument(skip(state))]
pub async fn handler(
    AxumState(state): AxumState<Arc<RwLock<State>>>,
    Query(params): Query<SnapshotParams>,
) -> Json<MarketSnapshot> {
    let state = state.read().await;
    Json(market_snapshot(&state.market, params.include_orders))
}
