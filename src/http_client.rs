use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ValidationError};
use crate::model::{Endpoint, ValidationRequest};
use crate::normalizer::RawResult;

/// Default public validation service
pub const DEFAULT_BASE_URL: &str = "https://jats-validator.now.sh";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the validation service
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 30,
            user_agent: format!("jats-validator/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Requests understood by the validation service.
///
/// Every call that takes a [`CancellationToken`] resolves to
/// [`ValidationError::Cancelled`] as soon as the token fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ValidationClient: Send + Sync {
    /// Validate `request.document` with the request's kind
    async fn submit(&self, request: &ValidationRequest) -> Result<RawResult>;

    /// Reformat a document; returns the formatted XML text
    async fn format(&self, document: &str, cancel: &CancellationToken) -> Result<String>;

    /// Download a document from an external URL
    async fn fetch_document(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    error: String,
}

/// reqwest-backed client for the validation service
pub struct HttpValidationClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpValidationClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(ValidationError::from)?;

        Ok(Self { client, config })
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.path()
        )
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Multipart body: the document as file field `xml`, plus the optional ruleset
    fn document_form(document: &str, schematron: Option<&str>) -> Result<Form> {
        let part = Part::bytes(document.as_bytes().to_vec())
            .file_name("input.xml")
            .mime_str("application/xml")?;

        let mut form = Form::new().part("xml", part);
        if let Some(ruleset) = schematron {
            form = form.text("schematron", ruleset.to_string());
        }
        Ok(form)
    }

    async fn post(&self, url: &str, form: Form) -> Result<Response> {
        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            self.client.post(url).multipart(form).send(),
        )
        .await
        .map_err(|_| ValidationError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(ValidationError::from)
    }

    async fn submit_uncancelled(&self, request: &ValidationRequest) -> Result<RawResult> {
        let url = self.endpoint_url(request.kind.endpoint());
        let form = Self::document_form(&request.document, request.schematron.as_deref())?;

        debug!(
            kind = %request.kind,
            version = request.version,
            generation = request.generation,
            bytes = request.document.len(),
            "submitting document"
        );

        let response = self.post(&url, form).await?;
        let status = response.status();
        if !status.is_success() {
            warn!(kind = %request.kind, status = status.as_u16(), "validation request failed");
            return Err(ValidationError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        RawResult::from_json(request.kind, &body).map_err(|e| ValidationError::InvalidResponse {
            url,
            details: e.to_string(),
        })
    }

    async fn format_uncancelled(&self, document: &str) -> Result<String> {
        let url = self.endpoint_url(Endpoint::Format);
        let response = self.post(&url, Self::document_form(document, None)?).await?;
        let status = response.status();

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.bytes().await?;
            return match serde_json::from_slice::<ServiceErrorBody>(&body) {
                Ok(reported) => Err(ValidationError::ServiceReported {
                    message: reported.error,
                }),
                Err(_) => Err(ValidationError::HttpStatus {
                    url,
                    status: status.as_u16(),
                }),
            };
        }
        if !status.is_success() {
            return Err(ValidationError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl ValidationClient for HttpValidationClient {
    async fn submit(&self, request: &ValidationRequest) -> Result<RawResult> {
        cancellable(&request.cancel, self.submit_uncancelled(request)).await
    }

    async fn format(&self, document: &str, cancel: &CancellationToken) -> Result<String> {
        cancellable(cancel, self.format_uncancelled(document)).await
    }

    async fn fetch_document(&self, url: &str) -> Result<String> {
        debug!(%url, "fetching document");
        let response = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            self.client.get(url).send(),
        )
        .await
        .map_err(|_| ValidationError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })??;

        let status = response.status();
        if !status.is_success() {
            return Err(ValidationError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Race `work` against `cancel`; cancellation wins ties.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ValidationError::Cancelled),
        result = work => result,
    }
}
