//! Dashboard statistics endpoint.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::middleware::auth::require_staff;
use crate::api::types::ApiContext;
use crate::dashboard::load_stats;
use crate::identity::CallerIdentity;
use crate::models::DashboardStats;

/// `GET /api/dashboard/stats`: staff only. Storage failures degrade to
/// zeroed stats rather than an error.
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<DashboardStats>, ApiError> {
    require_staff(&caller)?;
    let today = chrono::Utc::now().date_naive();
    Ok(Json(
        load_stats(ctx.patients.as_ref(), ctx.prescriptions.as_ref(), today).await,
    ))
}
