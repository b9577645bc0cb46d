use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use jats_validator::http_client::cancellable;
use jats_validator::{
    RawResult, Result, ValidationClient, ValidationError, ValidationKind, ValidationRequest,
};

/// Canned service answer
#[derive(Clone, Debug)]
pub struct MockReply {
    pub status: u16,
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
    /// Resolve even after the request's token fires, like a response that
    /// was already on the wire
    pub ignores_cancel: bool,
}

impl MockReply {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            body: body.to_string().into_bytes(),
            delay: None,
            ignores_cancel: false,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.as_bytes().to_vec(),
            delay: None,
            ignores_cancel: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::text(status, "")
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn uncancellable(mut self) -> Self {
        self.ignores_cancel = true;
        self
    }

    fn empty(kind: ValidationKind) -> Self {
        match kind {
            ValidationKind::Dtd => Self::json(json!({"errors": [], "warnings": []})),
            ValidationKind::Schematron => {
                Self::json(json!({"results": {"errors": [], "warnings": [], "passed": []}}))
            }
        }
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub kind: ValidationKind,
    pub version: u64,
    pub generation: u64,
    pub document: String,
    pub schematron: Option<String>,
    pub at: Instant,
}

/// In-process stand-in for the validation service. Honors cancellation the
/// same way the HTTP client does.
#[derive(Clone, Default)]
pub struct MockValidationService {
    replies: Arc<Mutex<HashMap<ValidationKind, MockReply>>>,
    format_reply: Arc<Mutex<Option<MockReply>>>,
    documents: Arc<Mutex<HashMap<String, String>>>,
    request_log: Arc<Mutex<Vec<RecordedRequest>>>,
    cancelled_log: Arc<Mutex<Vec<RecordedRequest>>>,
    format_log: Arc<Mutex<Vec<String>>>,
}

impl MockValidationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, kind: ValidationKind, reply: MockReply) -> &Self {
        self.replies.lock().unwrap().insert(kind, reply);
        self
    }

    pub fn format_reply(&self, reply: MockReply) -> &Self {
        *self.format_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn document(&self, url: &str, content: &str) -> &Self {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), content.to_string());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.request_log.lock().unwrap().clone()
    }

    pub fn requests_for(&self, kind: ValidationKind) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.kind == kind).collect()
    }

    pub fn cancelled(&self) -> Vec<RecordedRequest> {
        self.cancelled_log.lock().unwrap().clone()
    }

    pub fn formatted(&self) -> Vec<String> {
        self.format_log.lock().unwrap().clone()
    }

    pub fn client(&self) -> Arc<dyn ValidationClient> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ValidationClient for MockValidationService {
    async fn submit(&self, request: &ValidationRequest) -> Result<RawResult> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&request.kind)
            .cloned()
            .unwrap_or_else(|| MockReply::empty(request.kind));

        let recorded = RecordedRequest {
            kind: request.kind,
            version: request.version,
            generation: request.generation,
            document: request.document.to_string(),
            schematron: request.schematron.clone(),
            at: Instant::now(),
        };
        self.request_log.lock().unwrap().push(recorded.clone());

        let work = async {
            reply.wait().await;
            if reply.status != 200 {
                return Err(ValidationError::HttpStatus {
                    url: format!("mock://{}", request.kind),
                    status: reply.status,
                });
            }
            RawResult::from_json(request.kind, &reply.body).map_err(|e| {
                ValidationError::InvalidResponse {
                    url: format!("mock://{}", request.kind),
                    details: e.to_string(),
                }
            })
        };
        let outcome = if reply.ignores_cancel {
            work.await
        } else {
            cancellable(&request.cancel, work).await
        };

        if matches!(outcome, Err(ValidationError::Cancelled)) {
            self.cancelled_log.lock().unwrap().push(recorded);
        }
        outcome
    }

    async fn format(&self, document: &str, cancel: &CancellationToken) -> Result<String> {
        self.format_log.lock().unwrap().push(document.to_string());
        let reply = self
            .format_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| MockReply::text(200, document));

        cancellable(cancel, async {
            reply.wait().await;
            match reply.status {
                200 => Ok(String::from_utf8_lossy(&reply.body).into_owned()),
                422 => {
                    let body: Value = serde_json::from_slice(&reply.body).map_err(|e| {
                        ValidationError::InvalidResponse {
                            url: "mock://format".to_string(),
                            details: e.to_string(),
                        }
                    })?;
                    Err(ValidationError::ServiceReported {
                        message: body["error"].as_str().unwrap_or_default().to_string(),
                    })
                }
                status => Err(ValidationError::HttpStatus {
                    url: "mock://format".to_string(),
                    status,
                }),
            }
        })
        .await
    }

    async fn fetch_document(&self, url: &str) -> Result<String> {
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ValidationError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}
