use super::auth::{CredentialStore, SharedToken};
use super::error::{error_detail, ApiError};
use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{AskRequest, ChatHistory, TimestampResponse};
use crate::util::{is_local_endpoint_url, join_url};
use bytes::Bytes;
#[cfg(test)]
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
pub trait MockBackend: Send + Sync {
    fn open_stream(&self, file_id: &str, request: &AskRequest) -> Result<ByteStream, ApiError>;
    fn fetch_history(&self, file_id: &str) -> BoxFuture<'static, Result<ChatHistory, ApiError>>;
}

/// HTTP access to the document Q&A backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    credentials: Arc<dyn CredentialStore>,
    request_timeout: Duration,
    #[cfg(test)]
    mock_backend: Option<Arc<dyn MockBackend>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        let credentials = Arc::new(SharedToken::new(config.access_token.clone()));
        Self::with_credentials(config, credentials)
    }

    pub fn with_credentials(config: &Config, credentials: Arc<dyn CredentialStore>) -> Self {
        // No whole-request timeout here: it would cut long answer streams.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            api_url: config.api_url.clone(),
            credentials,
            request_timeout: config.request_timeout,
            #[cfg(test)]
            mock_backend: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(mock_backend: Arc<dyn MockBackend>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: "http://localhost:8000/api/v1".to_string(),
            credentials: Arc::new(SharedToken::new(None)),
            request_timeout: Duration::from_secs(5),
            mock_backend: Some(mock_backend),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }

    /// Submits a question and hands back the raw answer body.
    ///
    /// A non-2xx status fails here; the body is only exposed as a stream for
    /// successful responses.
    pub async fn open_stream(
        &self,
        file_id: &str,
        request: &AskRequest,
    ) -> Result<ByteStream, ApiError> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.open_stream(file_id, request);
            }
        }

        let request_url = join_url(&self.api_url, &format!("chat/{file_id}/ask/stream"));
        if debug_payload_enabled() {
            let payload = serde_json::to_value(request).unwrap_or_default();
            emit_debug_payload(&request_url, &payload);
        }

        let builder = self
            .http
            .post(&request_url)
            .header("accept", "text/event-stream")
            .json(request);
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        let response = ensure_success(response, &request_url).await?;

        tracing::debug!(url = %request_url, "answer stream opened");
        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    pub async fn fetch_history(&self, file_id: &str) -> Result<ChatHistory, ApiError> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.fetch_history(file_id).await;
            }
        }

        let request_url = join_url(&self.api_url, &format!("chat/{file_id}/history"));
        self.get_json(&request_url).await
    }

    /// Topic timestamps for a media file; `None` until extraction has run.
    pub async fn fetch_timestamps(
        &self,
        file_id: &str,
    ) -> Result<Option<TimestampResponse>, ApiError> {
        let request_url = join_url(&self.api_url, &format!("timestamps/{file_id}"));
        match self.get_json(&request_url).await {
            Ok(response) => Ok(Some(response)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, request_url: &str) -> Result<T, ApiError> {
        let builder = self.http.get(request_url).timeout(self.request_timeout);
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, request_url))?;
        let response = ensure_success(response, request_url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|error| map_api_request_error(error, request_url))?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            url: request_url.to_string(),
            source,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.access_token() {
            Some(token) => builder.header("authorization", format!("Bearer {token}")),
            None => builder,
        }
    }
}

async fn ensure_success(
    response: reqwest::Response,
    request_url: &str,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        url: request_url.to_string(),
        status,
        detail: error_detail(&body),
    })
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> ApiError {
    let url = request_url.to_string();
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return ApiError::LocalUnreachable { url, source: error };
    }
    if error.is_connect() {
        return ApiError::Unreachable { url, source: error };
    }
    if error.is_timeout() {
        return ApiError::Timeout { url };
    }
    ApiError::Request { url, source: error }
}
