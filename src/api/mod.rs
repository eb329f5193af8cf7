pub mod snapshot;

use std::sync::Arc;

use axum::extract::State as AxumState;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::RwLock;
use utoipa::OpenApi;

use crate::State;

#[derive(OpenApi)]
#[openapi(
    paths(snapshot::handler),
    tags((name = "market", description = "Live order book snapshot export")),
    info(
        title = "MBO Order Book API",
        version = "0.1.0",
        description = "Real-time market-by-order book engine"
    )
)]
struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> Html<&'static str> {
    Html(r#"<!DOCTYPE html>
<html>
<head>
    <title>MBO Order Book API</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({ url: "/openapi.json", dom_id: '#swagger-ui' });
        };
    </script>
</body>
</html>"#)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn ready_check(AxumState(state): AxumState<Arc<RwLock<State>>>) -> StatusCode {
    let _ = state.read().await;
    StatusCode::OK
}

async fn metrics_handler(
    AxumState(state): AxumState<Arc<RwLock<State>>>,
) -> Result<(StatusCode, String), (StatusCode, String)> {
    let state = state.read().await;
    state
        .metrics
        .encode()
        .map(|bytes| (StatusCode::OK, String::from_utf8_lossy(&bytes).to_string()))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {e}"),
            )
        })
}

pub fn router(state: Arc<RwLock<State>>) -> Router {
    let api_router = Router::new()
        .route("/market/snapshot", get(snapshot::handler))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/", get(swagger_ui))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_router)
        .with_state(state)
}
