use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use uuid::Uuid;

use super::supabase::{send_error, status_error, SupabaseClient};
use super::{DatabaseError, ImageStore};

pub const PRESCRIPTION_BUCKET: &str = "prescription-images";
const SIGNED_URL_TTL_SECS: u64 = 60 * 60 * 24 * 365;

fn object_path(extension: &str) -> String {
    let ext = extension.trim_start_matches('.');
    let ext = if ext.is_empty() { "jpg" } else { ext };
    format!("prescriptions/{}.{ext}", Uuid::new_v4().simple())
}

/// Writes images under a local directory. The returned reference is the
/// path relative to that directory.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload_image(
        &self,
        data: Vec<u8>,
        extension: &str,
        _content_type: &str,
    ) -> Result<String, DatabaseError> {
        let relative = object_path(extension);
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DatabaseError::Io(e.to_string()))?;
        }
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| DatabaseError::Io(e.to_string()))?;
        tracing::debug!(path = %target.display(), "Stored prescription image");
        Ok(relative)
    }
}

/// Supabase Storage bucket with long-lived signed URLs.
pub struct SupabaseImageStore {
    client: SupabaseClient,
    bucket: String,
}

impl SupabaseImageStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self {
            client,
            bucket: PRESCRIPTION_BUCKET.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[async_trait]
impl ImageStore for SupabaseImageStore {
    async fn upload_image(
        &self,
        data: Vec<u8>,
        extension: &str,
        content_type: &str,
    ) -> Result<String, DatabaseError> {
        let path = object_path(extension);

        let response = self
            .client
            .request(Method::POST, &format!("/storage/v1/object/{}/{path}", self.bucket))
            .header("content-type", content_type)
            .body(data)
            .send()
            .await
            .map_err(send_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.bucket, status, body));
        }

        let response = self
            .client
            .request(Method::POST, &format!("/storage/v1/object/sign/{}/{path}", self.bucket))
            .json(&serde_json::json!({ "expiresIn": SIGNED_URL_TTL_SECS }))
            .send()
            .await
            .map_err(send_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.bucket, status, body));
        }
        let signed: SignedUrlResponse = response.json().await.map_err(send_error)?;
        Ok(format!("{}/storage/v1{}", self.client.base_url(), signed.signed_url))
    }
}
