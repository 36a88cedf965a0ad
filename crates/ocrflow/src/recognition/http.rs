//! HTTP client for the recognition service.
//!
//! `POST {endpoint}/jobs` starts a job and returns `{"handle": "..."}`.
//! `GET {endpoint}/jobs/{handle}` reports its status and, once finished,
//! the recognized blocks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{PollResponse, RecognitionError, RecognitionHandle, RecognitionMode, TextRecognizer};
use crate::storage::ObjectRef;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    container: &'a str,
    key: &'a str,
    mode: RecognitionMode,
}

#[derive(Deserialize)]
struct SubmitResponse {
    handle: String,
}

pub struct HttpRecognitionClient {
    client: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
}

impl HttpRecognitionClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| RecognitionError::Client(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(RecognitionError::Client(format!(
                "endpoint '{}' cannot carry a path",
                endpoint
            )));
        }

        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| RecognitionError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RecognitionError> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                RecognitionError::Client(format!("endpoint '{}' cannot carry a path", self.endpoint))
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        handle: Option<&str>,
    ) -> Result<reqwest::Response, RecognitionError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RecognitionError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, handle))
    }
}

/// Maps a non-success HTTP status to the error taxonomy the poller acts on.
fn classify_status(status: StatusCode, body: &str, handle: Option<&str>) -> RecognitionError {
    let detail = if body.trim().is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body.trim())
    };

    match (status, handle) {
        (StatusCode::NOT_FOUND, Some(handle)) => RecognitionError::InvalidHandle(handle.to_string()),
        (StatusCode::TOO_MANY_REQUESTS, _) | (StatusCode::REQUEST_TIMEOUT, _) => {
            RecognitionError::Transient(detail)
        }
        (s, _) if s.is_server_error() => RecognitionError::Transient(detail),
        _ => RecognitionError::Rejected(detail),
    }
}

#[async_trait]
impl TextRecognizer for HttpRecognitionClient {
    async fn submit(
        &self,
        object: &ObjectRef,
        mode: RecognitionMode,
    ) -> Result<RecognitionHandle, RecognitionError> {
        let url = self.url(&["jobs"])?;
        let body = SubmitRequest {
            container: &object.container,
            key: &object.key,
            mode,
        };

        let response = self.send(self.client.post(url).json(&body), None).await?;
        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| RecognitionError::Decode(e.to_string()))?;

        if parsed.handle.trim().is_empty() {
            return Err(RecognitionError::Decode("empty job handle".to_string()));
        }

        log::debug!("Submitted {} for {} as {}", object, mode, parsed.handle);
        Ok(RecognitionHandle(parsed.handle))
    }

    async fn poll(&self, handle: &RecognitionHandle) -> Result<PollResponse, RecognitionError> {
        let url = self.url(&["jobs", handle.as_str()])?;
        let response = self.send(self.client.get(url), Some(handle.as_str())).await?;

        response
            .json::<PollResponse>()
            .await
            .map_err(|e| RecognitionError::Decode(e.to_string()))
    }
}
