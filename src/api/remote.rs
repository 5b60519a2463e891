use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use crate::api::{FileSizeRequest, FileSizeResponse, RemoteDownloadRequest, RemotePayload};
use crate::errors::{AppError, Result};

/// Fixed retry budget for calls to the extraction server. Every attempt gets
/// its own timeout; `retries` counts attempts after the first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// The remote extraction server.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// `POST /download`: extracts the media behind a hosted-video page.
    async fn download(&self, request: &RemoteDownloadRequest) -> Result<RemotePayload>;

    /// `POST /get-file-size`. `Ok(None)` when the server knows no size.
    async fn file_size(&self, request: &FileSizeRequest) -> Result<Option<u64>>;

    /// `GET /status`: true on a 2xx answer.
    async fn status(&self) -> Result<bool>;
}

pub struct HttpRemoteService {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    status_timeout: Duration,
}

impl HttpRemoteService {
    pub fn new(client: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
            status_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_with_retry<T>(&self, path: &str, body: &T) -> Result<Response>
    where
        T: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path);
        let attempts = self.retry.retries + 1;

        for attempt in 1..=attempts {
            log::debug!("[REMOTE] Attempt {} of {} for {}", attempt, attempts, url);

            match self.try_post(&url, body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    log::warn!("[REMOTE] Attempt {} failed: {}", attempt, e);
                    log::info!("[REMOTE] Retrying in {:?}...", self.retry.delay);
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    log::error!("[REMOTE] {} failed after {} attempt(s): {}", url, attempt, e);
                    return Err(e);
                }
            }
        }

        Err(AppError::Timeout(format!("no attempts made for {}", url)))
    }

    async fn try_post<T>(&self, url: &str, body: &T) -> Result<Response>
    where
        T: Serialize + ?Sized + Sync,
    {
        let send = self.client.post(url).json(body).send();
        let response = tokio::time::timeout(self.retry.attempt_timeout, send)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "no response from {} within {:?}",
                    url, self.retry.attempt_timeout
                ))
            })??;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Server {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn download(&self, request: &RemoteDownloadRequest) -> Result<RemotePayload> {
        let response = self.post_with_retry("download", request).await?;

        let content_disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        log::info!(
            "[REMOTE] Received {} bytes for {} (content-disposition: {:?})",
            bytes.len(),
            request.url,
            content_disposition
        );

        Ok(RemotePayload {
            bytes,
            content_disposition,
        })
    }

    async fn file_size(&self, request: &FileSizeRequest) -> Result<Option<u64>> {
        let response = self.post_with_retry("get-file-size", request).await?;
        let body: FileSizeResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(AppError::Remote(error));
        }

        Ok(body.size.filter(|size| *size > 0))
    }

    async fn status(&self) -> Result<bool> {
        let url = self.endpoint("status");
        let response = tokio::time::timeout(self.status_timeout, self.client.get(&url).send())
            .await
            .map_err(|_| AppError::Timeout(format!("status check exceeded {:?}", self.status_timeout)))??;

        Ok(response.status().is_success())
    }
}
