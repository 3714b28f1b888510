use std::time::Instant;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).compact().init();
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// RPC failures travel inside 200 replies, so a non-2xx status means the
/// request never reached the dispatcher.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let content_type = header_text(request.headers(), header::CONTENT_TYPE);
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let elapsed_ms = started_at.elapsed().as_millis();

    if response.status().is_success() {
        debug!(
            method = %method,
            path = %path,
            content_type = %content_type,
            status,
            duration_ms = elapsed_ms,
            "exchange"
        );
    } else {
        warn!(
            method = %method,
            path = %path,
            content_type = %content_type,
            status,
            duration_ms = elapsed_ms,
            "request rejected before dispatch"
        );
    }

    response
}
