//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it through the
//! injected identity provider (via the auth cache), and injects
//! `CallerIdentity` into request extensions for downstream handlers.

use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::identity::CallerIdentity;

/// Require a valid bearer token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// The resolved caller is also attached to the response so the audit layer
/// can log it.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;

    let cached = {
        let mut cache = ctx
            .auth_cache
            .lock()
            .map_err(|_| ApiError::Internal("auth cache lock".into()))?;
        cache.get(&token)
    }; // MutexGuard dropped here, before any .await

    let caller = match cached {
        Some(caller) => caller,
        None => {
            let caller = ctx.identity.resolve(&token).await.map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                ApiError::from(e)
            })?;
            if let Ok(mut cache) = ctx.auth_cache.lock() {
                cache.insert(&token, caller.clone());
            }
            caller
        }
    };

    req.extensions_mut().insert(caller.clone());

    let mut response = next.run(req).await;
    response.extensions_mut().insert(caller);
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Clinic-wide data is for doctors and admins only.
pub fn require_staff(caller: &CallerIdentity) -> Result<(), ApiError> {
    if caller.role.is_staff() {
        Ok(())
    } else {
        tracing::warn!(user_id = %caller.user_id, role = %caller.role, "Role not permitted");
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("Authorization", HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_token(&headers("Bearer abc")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn role_guard() {
        let caller = |role| CallerIdentity {
            user_id: "u".into(),
            role,
            email: None,
        };
        assert!(require_staff(&caller(Role::Doctor)).is_ok());
        assert!(require_staff(&caller(Role::Admin)).is_ok());
        assert!(matches!(
            require_staff(&caller(Role::Patient)),
            Err(ApiError::Forbidden)
        ));
    }
}
