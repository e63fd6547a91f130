//! Caller identity endpoint.

use axum::{Extension, Json};
use serde::Serialize;

use crate::identity::CallerIdentity;
use crate::models::enums::Role;

#[derive(Serialize)]
pub struct MeResponse {
    pub id: String,
    pub role: Role,
    pub email: Option<String>,
}

/// `GET /api/auth/me`: who the bearer token belongs to.
pub async fn me(Extension(caller): Extension<CallerIdentity>) -> Json<MeResponse> {
    Json(MeResponse {
        id: caller.user_id,
        role: caller.role,
        email: caller.email,
    })
}
