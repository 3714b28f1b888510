//! Axum handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::AppState;

/// Sent with every RPC reply so intermediaries never cache it
pub const NO_CACHE_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::PRAGMA, "no-cache"),
    (header::CACHE_CONTROL, "no-cache, must-revalidate"),
    (header::EXPIRES, "Sat, 26 Jul 1997 05:00:00 GMT"),
];

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// The RPC endpoint. Always answers 200; errors travel inside the body.
pub async fn rpc_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let reply = state.dispatcher.handle_bytes(&body).await;
    let protocol = state.dispatcher.protocol();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, protocol.content_type())],
        NO_CACHE_HEADERS,
        reply,
    )
        .into_response()
}
