use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{is_valid_content_id, ContentUploader};
use crate::config::StorageConfig;
use crate::error::{HauntedError, HauntedResult};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    cid: String,
}

/// Uploader backed by a pinning service that accepts raw bytes.
pub struct HttpContentUploader {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpContentUploader {
    pub fn new(config: &StorageConfig) -> HauntedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HauntedError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl ContentUploader for HttpContentUploader {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> HauntedResult<String> {
        let size = bytes.len();
        let mut request = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("Content-Type", mime_type)
            .header("X-Filename", filename)
            .body(bytes);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| HauntedError::UploadFailed {
            message: e.to_string(),
            transient: true,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HauntedError::UploadFailed {
                message: format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
                transient: is_transient_status(status),
            });
        }

        let body: UploadResponse = response.json().await.map_err(|e| {
            HauntedError::UploadFailed {
                message: format!("malformed upload response: {}", e),
                transient: false,
            }
        })?;

        if !is_valid_content_id(&body.cid) {
            return Err(HauntedError::InvalidContentId(body.cid));
        }

        debug!(filename, size, cid = %body.cid, "Artifact uploaded");
        Ok(body.cid)
    }
}
