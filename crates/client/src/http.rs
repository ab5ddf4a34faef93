//! HTTP implementation of the platform client.
//!
//! One `reqwest::Client` (with its internal connection pool) serves every
//! component; a semaphore with `HTTP_CLIENT_POOL_SIZE` permits bounds how
//! many requests are in flight at once. Transient failures are retried
//! with capped exponential backoff before a terminal error is returned.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use skymount_common::HTTP_CLIENT_POOL_SIZE;

use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::traits::PlatformClient;
use crate::types::{DownloadUrl, FolderListing, ObjectDescribe, ProjectDescribe};

/// Retry attempts before a transient failure becomes terminal.
const MAX_ATTEMPTS: u32 = 5;
/// First backoff delay; doubles per attempt up to `BACKOFF_CAP`.
const BACKOFF_BASE: Duration = Duration::from_millis(200);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Platform client backed by the HTTP API.
pub struct HttpPlatformClient {
    http: reqwest::Client,
    config: ApiConfig,
    /// Bounds concurrent requests across all callers.
    permits: Arc<Semaphore>,
}

impl HttpPlatformClient {
    pub fn new(config: ApiConfig) -> Result<Self, ClientError> {
        let http: reqwest::Client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self {
            http,
            config,
            permits: Arc::new(Semaphore::new(HTTP_CLIENT_POOL_SIZE)),
        })
    }

    /// Delay before the next retry attempt (0-based), capped exponential.
    fn backoff_delay(attempt: u32) -> Duration {
        BACKOFF_CAP.min(BACKOFF_BASE * 2u32.saturating_pow(attempt.min(16)))
    }

    /// POST a JSON body to an API route and decode a JSON response,
    /// retrying transient failures.
    async fn call<Req, Resp>(&self, route: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let url: String = format!("{}/{}", self.config.base_url, route);
        let mut attempt: u32 = 0;
        loop {
            let result: Result<Resp, ClientError> = self.call_once(&url, body).await;
            match result {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay: Duration = Self::backoff_delay(attempt);
                    warn!(route, attempt, ?delay, error = %e, "retrying platform call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once<Req, Resp>(&self, url: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let _permit = self.permits.acquire().await.map_err(|_| ClientError::Network {
            message: "client pool closed".into(),
            retryable: false,
        })?;

        let response: reqwest::Response = self
            .http
            .post(url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status: reqwest::StatusCode = response.status();
        if status.is_success() {
            response
                .json::<Resp>()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))
        } else {
            let message: String = response.text().await.unwrap_or_default();
            Err(status_error(status, url, message))
        }
    }
}

fn transport_error(e: reqwest::Error) -> ClientError {
    ClientError::Network {
        message: e.to_string(),
        retryable: e.is_timeout() || e.is_connect() || e.is_request(),
    }
}

fn status_error(status: reqwest::StatusCode, subject: &str, message: String) -> ClientError {
    match status.as_u16() {
        404 => ClientError::NotFound {
            id: subject.to_string(),
        },
        401 | 403 => ClientError::PermissionDenied {
            id: subject.to_string(),
            message,
        },
        s if (400..500).contains(&s) => ClientError::Http { status: s, message },
        s => ClientError::Network {
            message: format!("HTTP {}: {}", s, message),
            retryable: true,
        },
    }
}

#[derive(Serialize)]
struct DescribeObjectsRequest<'a> {
    ids: &'a [String],
}

#[derive(Deserialize)]
struct DescribeObjectsResponse {
    results: HashMap<String, ObjectDescribe>,
}

#[derive(Serialize)]
struct ListFolderRequest<'a> {
    folder: &'a str,
}

#[derive(Serialize)]
struct DownloadUrlRequest<'a> {
    project: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn describe_project(&self, project_id: &str) -> Result<ProjectDescribe, ClientError> {
        debug!(project_id, "describe project");
        let route: String = format!("{}/describe", project_id);
        self.call(&route, &serde_json::json!({})).await.map_err(|e| match e {
            // Rewrite the subject so callers see the project id, not the URL.
            ClientError::NotFound { .. } => ClientError::NotFound {
                id: project_id.to_string(),
            },
            ClientError::PermissionDenied { message, .. } => ClientError::PermissionDenied {
                id: project_id.to_string(),
                message,
            },
            other => other,
        })
    }

    async fn describe_objects(
        &self,
        object_ids: &[String],
    ) -> Result<HashMap<String, ObjectDescribe>, ClientError> {
        if object_ids.is_empty() {
            return Ok(HashMap::new());
        }
        debug!(count = object_ids.len(), "bulk describe objects");
        let request = DescribeObjectsRequest { ids: object_ids };
        let response: DescribeObjectsResponse =
            self.call("system/describeObjects", &request).await?;
        Ok(response.results)
    }

    async fn list_folder(
        &self,
        project_id: &str,
        folder: &str,
    ) -> Result<FolderListing, ClientError> {
        debug!(project_id, folder, "list folder");
        let route: String = format!("{}/listFolder", project_id);
        self.call(&route, &ListFolderRequest { folder }).await
    }

    async fn get_download_url(
        &self,
        file_id: &str,
        project_id: &str,
    ) -> Result<DownloadUrl, ClientError> {
        debug!(file_id, project_id, "request download URL");
        let route: String = format!("{}/download", file_id);
        self.call(&route, &DownloadUrlRequest { project: project_id }).await
    }

    async fn fetch_url_range(
        &self,
        url: &DownloadUrl,
        start: u64,
        len: u64,
    ) -> Result<Vec<u8>, ClientError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut attempt: u32 = 0;
        loop {
            let result: Result<Vec<u8>, ClientError> = self.fetch_range_once(url, start, len).await;
            match result {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay: Duration = Self::backoff_delay(attempt);
                    warn!(start, len, attempt, error = %e, "retrying ranged fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        project_id: &str,
        remote_folder: &str,
        name: &str,
    ) -> Result<String, ClientError> {
        let data: Vec<u8> = tokio::fs::read(local_path).await.map_err(|e| ClientError::Io {
            path: local_path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(project_id, remote_folder, name, bytes = data.len(), "upload file");

        let _permit = self.permits.acquire().await.map_err(|_| ClientError::Network {
            message: "client pool closed".into(),
            retryable: false,
        })?;
        let url: String = format!("{}/{}/upload", self.config.base_url, project_id);
        let response: reqwest::Response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .query(&[("folder", remote_folder), ("name", name)])
            .body(data)
            .send()
            .await
            .map_err(transport_error)?;

        let status: reqwest::StatusCode = response.status();
        if status.is_success() {
            let parsed: UploadResponse = response
                .json()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
            Ok(parsed.id)
        } else {
            let message: String = response.text().await.unwrap_or_default();
            Err(status_error(status, project_id, message))
        }
    }
}

impl HttpPlatformClient {
    async fn fetch_range_once(
        &self,
        url: &DownloadUrl,
        start: u64,
        len: u64,
    ) -> Result<Vec<u8>, ClientError> {
        let _permit = self.permits.acquire().await.map_err(|_| ClientError::Network {
            message: "client pool closed".into(),
            retryable: false,
        })?;

        let mut request: reqwest::RequestBuilder = self
            .http
            .get(&url.url)
            .header("Range", format!("bytes={}-{}", start, start + len - 1));
        for (k, v) in &url.headers {
            request = request.header(k, v);
        }

        let response: reqwest::Response = request.send().await.map_err(transport_error)?;
        let status: reqwest::StatusCode = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| ClientError::Network {
                    message: e.to_string(),
                    retryable: true,
                })?;
            Ok(body.to_vec())
        } else {
            let message: String = response.text().await.unwrap_or_default();
            Err(status_error(status, &url.url, message))
        }
    }
}
