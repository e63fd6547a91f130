//! API router.
//!
//! Returns a composable `Router` with all routes nested under `/api/`.
//!
//! Layer stack (outermost → innermost):
//! CORS → security headers → audit → body limit → auth (protected routes only)

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Request body ceiling: largest audio upload plus multipart overhead.
pub const MAX_BODY_BYTES: usize = endpoints::patients::MAX_AUDIO_BYTES + 1024 * 1024;

/// Origins always allowed in addition to the configured frontend.
pub const DEV_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer
/// of the protected routes). Handlers use `State<ApiContext>`.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext, frontend_url: &str) -> Router {
    let protected = Router::new()
        .route(
            "/patients",
            post(endpoints::patients::create).get(endpoints::patients::list),
        )
        .route(
            "/patients/transcribe-voice",
            post(endpoints::patients::transcribe_voice),
        )
        .route(
            "/patients/:id",
            get(endpoints::patients::detail).delete(endpoints::patients::delete),
        )
        .route("/prescriptions", get(endpoints::prescriptions::list))
        .route(
            "/prescriptions/digitize",
            post(endpoints::prescriptions::digitize),
        )
        .route("/prescriptions/:id", get(endpoints::prescriptions::detail))
        .route(
            "/prescriptions/:id/status",
            patch(endpoints::prescriptions::update_status),
        )
        .route("/dashboard/stats", get(endpoints::dashboard::stats))
        .route("/auth/me", get(endpoints::auth::me))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outer to auth so it can extract ApiContext
        .layer(axum::Extension(ctx));

    let unprotected = Router::new().route("/health", get(endpoints::health::check));

    Router::new()
        .nest("/api", protected.merge(unprotected))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(cors_layer(frontend_url))
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in std::iter::once(frontend_url).chain(DEV_ORIGINS.iter().copied()) {
        match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) if !origins.contains(&value) => origins.push(value),
            Ok(_) => {}
            Err(_) => tracing::warn!(origin, "Ignoring invalid CORS origin"),
        }
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}
