//! Audit logging middleware.
//!
//! Logs every API request with method, path, caller, status and latency.
//! Runs outermost so rejected requests are logged too; the caller id is read
//! from the response extensions set by the auth layer.

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::identity::CallerIdentity;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let caller = response
        .extensions()
        .get::<CallerIdentity>()
        .map(|c| c.user_id.as_str())
        .unwrap_or("anonymous");
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        tracing::warn!(%method, %path, caller, status, elapsed_ms, "API request failed");
    } else {
        tracing::info!(%method, %path, caller, status, elapsed_ms, "API request");
    }

    response
}
