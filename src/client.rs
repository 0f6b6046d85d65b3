use crate::types::{
    CreatePlanRequest, CreatePlanResponse, EditPlanRequest, EditPlanResponse, HealthCheckResponse,
};
use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://plangen.waleeds.world";

/// Longest slice of an error body kept in `ApiError::Status`.
const ERROR_BODY_LIMIT: usize = 300;

// ===================================================================
// Errors
// ===================================================================

/// Failure of a single HTTP call. `status()` is what retry classification
/// keys on: `None` means the request never got an HTTP answer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{operation} failed: HTTP {status} {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("{operation} failed: {cause}")]
    Transport {
        operation: &'static str,
        cause: reqwest::Error,
    },
    #[error("{operation} returned an unreadable response (HTTP {status}): {cause}")]
    Decode {
        operation: &'static str,
        status: u16,
        cause: serde_json::Error,
    },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } | ApiError::Decode { status, .. } => Some(*status),
            ApiError::Transport { cause, .. } => cause.status().map(|s| s.as_u16()),
        }
    }

    /// Network-level failures and server errors are worth another attempt;
    /// client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self.status() {
            None => true,
            Some(status) => status >= 500,
        }
    }
}

// ===================================================================
// Attachments
// ===================================================================

/// An optional style/reference image sent with an edit.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ReferenceImage {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading reference image {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference".into());
        let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();
        Ok(Self {
            file_name,
            mime,
            bytes,
        })
    }
}

// ===================================================================
// Client
// ===================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self::with_http(http, base_url))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Absolute URLs pass through; anything else is taken relative to the
    /// API base.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.endpoint(url)
        }
    }

    pub fn download_url(&self, filename: &str) -> String {
        self.endpoint(&format!("download/{filename}"))
    }

    pub async fn create_plan(&self, request: &CreatePlanRequest) -> Result<CreatePlanResponse, ApiError> {
        const OP: &str = "create floor plan";
        log::info!("POST /create_plan ({} zones)", request.zones.len());
        let response = self
            .http
            .post(self.endpoint("create_plan"))
            .json(request)
            .send()
            .await
            .map_err(|cause| ApiError::Transport { operation: OP, cause })?;
        read_json(OP, response).await
    }

    pub async fn edit_plan(
        &self,
        request: &EditPlanRequest,
        edited_png: &[u8],
        reference: Option<&ReferenceImage>,
    ) -> Result<EditPlanResponse, ApiError> {
        const OP: &str = "edit floor plan";
        let transport = |cause| ApiError::Transport { operation: OP, cause };

        let edited = Part::bytes(edited_png.to_vec())
            .file_name("edited_image.png")
            .mime_str("image/png")
            .map_err(transport)?;
        let mut form = Form::new()
            .text("image_url", request.image_url.clone())
            .text("action_type", request.action_type.as_str())
            .text("prompt", request.prompt.clone())
            .part("edited_image", edited);
        if let Some(reference) = reference {
            let part = Part::bytes(reference.bytes.clone())
                .file_name(reference.file_name.clone())
                .mime_str(&reference.mime)
                .map_err(transport)?;
            form = form.part("reference_image", part);
        }

        log::info!(
            "POST /edit ({}, {} byte image)",
            request.action_type,
            edited_png.len()
        );
        let response = self
            .http
            .post(self.endpoint("edit"))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        read_json(OP, response).await
    }

    pub async fn health(&self) -> Result<HealthCheckResponse, ApiError> {
        const OP: &str = "health check";
        let response = self
            .http
            .get(self.endpoint("health"))
            .send()
            .await
            .map_err(|cause| ApiError::Transport { operation: OP, cause })?;
        read_json(OP, response).await
    }

    pub async fn download(&self, filename: &str) -> Result<Vec<u8>, ApiError> {
        self.get_bytes("download", &self.download_url(filename)).await
    }

    /// Fetch a plan image (absolute or base-relative URL).
    pub async fn fetch_image(&self, image_url: &str) -> Result<Vec<u8>, ApiError> {
        self.get_bytes("fetch plan image", &self.resolve_url(image_url))
            .await
    }

    async fn get_bytes(&self, operation: &'static str, url: &str) -> Result<Vec<u8>, ApiError> {
        log::debug!("GET {url}");
        let transport = |cause| ApiError::Transport { operation, cause };
        let response = self.http.get(url).send().await.map_err(transport)?;
        let response = check_status(operation, response).await?;
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Turn a non-2xx response into `ApiError::Status`, keeping the start of
/// the body for diagnostics.
async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    log::debug!("{operation}: HTTP {status}: {body}");
    Err(ApiError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let response = check_status(operation, response).await?;
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|cause| ApiError::Transport { operation, cause })?;
    serde_json::from_slice(&bytes).map_err(|cause| ApiError::Decode {
        operation,
        status,
        cause,
    })
}
