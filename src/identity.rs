//! Caller identity: who is calling and with which role.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;

use crate::db::supabase::SupabaseClient;
use crate::models::enums::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub role: Role,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid token table entry: {0}")]
    InvalidEntry(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<CallerIdentity, IdentityError>;
}

// ═══════════════════════════════════════════════════════════
// Supabase Auth
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct ProfileRow {
    role: Option<String>,
}

/// Validates tokens against `/auth/v1/user`. Role comes from the `profiles`
/// table, then user metadata, then defaults to patient.
pub struct SupabaseIdentityProvider {
    client: SupabaseClient,
}

impl SupabaseIdentityProvider {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn profile_role(&self, user_id: &str) -> Option<Role> {
        let response = self
            .client
            .request(Method::GET, "/rest/v1/profiles")
            .query(&[("id", format!("eq.{user_id}")), ("select", "role".to_string())])
            .send()
            .await;
        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(status = %r.status(), "Profile lookup returned no role");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e.without_url(), "Profile lookup failed");
                return None;
            }
        };
        let rows: Vec<ProfileRow> = response.json().await.ok()?;
        rows.into_iter()
            .find_map(|row| row.role)
            .and_then(|role| role.trim().to_lowercase().parse().ok())
    }
}

fn metadata_role(metadata: &serde_json::Value) -> Option<Role> {
    metadata
        .get("role")
        .and_then(|v| v.as_str())
        .and_then(|s| s.trim().to_lowercase().parse().ok())
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<CallerIdentity, IdentityError> {
        let response = self
            .client
            .user_request(Method::GET, "/auth/v1/user", token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.without_url().to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(IdentityError::InvalidToken),
            s => return Err(IdentityError::Unavailable(format!("auth service returned {s}"))),
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.without_url().to_string()))?;

        let role = match self.profile_role(&user.id).await {
            Some(role) => role,
            None => metadata_role(&user.user_metadata).unwrap_or(Role::Patient),
        };

        Ok(CallerIdentity {
            user_id: user.id,
            role,
            email: user.email,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Static token table
// ═══════════════════════════════════════════════════════════

/// Fixed `token -> identity` table for the local backend.
pub struct StaticIdentityProvider {
    tokens: HashMap<String, CallerIdentity>,
}

impl StaticIdentityProvider {
    pub fn new(entries: impl IntoIterator<Item = (String, CallerIdentity)>) -> Self {
        Self {
            tokens: entries.into_iter().collect(),
        }
    }

    /// Parse `token:user_id:role` entries separated by commas.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let mut tokens = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [token, user_id, role] = parts.as_slice() else {
                return Err(IdentityError::InvalidEntry(mask(entry)));
            };
            if token.is_empty() || user_id.is_empty() {
                return Err(IdentityError::InvalidEntry(mask(entry)));
            }
            let role: Role = role
                .to_lowercase()
                .parse()
                .map_err(|_| IdentityError::InvalidEntry(mask(entry)))?;
            tokens.insert(
                token.to_string(),
                CallerIdentity {
                    user_id: user_id.to_string(),
                    role,
                    email: None,
                },
            );
        }
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Never echo the token itself in errors.
fn mask(entry: &str) -> String {
    match entry.split_once(':') {
        Some((_, rest)) => format!("***:{rest}"),
        None => "***".to_string(),
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<CallerIdentity, IdentityError> {
        self.tokens.get(token).cloned().ok_or(IdentityError::InvalidToken)
    }
}
