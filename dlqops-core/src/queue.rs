//! Queue backend abstraction and the SQS client
//!
//! `QueueBackend` is the seam the gateway drains through. `SqsQueueClient` speaks the
//! SQS JSON protocol (`X-Amz-Target: AmazonSQS.*`) against a configured endpoint, so
//! it works against LocalStack or any SQS-compatible gateway. Transport calls are
//! retried with exponential backoff; non-retryable API errors surface immediately.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::DlqOpsConfig;
use crate::models::{MessageMetadata, QueueMessage};

/// Provider ceiling for both receive and delete batches.
pub const MAX_BATCH_SIZE: usize = 10;

const AMZ_JSON: &str = "application/x-amz-json-1.0";
const APPROXIMATE_NUMBER_OF_MESSAGES: &str = "ApproximateNumberOfMessages";
const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

// ============================================================================
// QueueBackend trait
// ============================================================================

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Receive up to `max_messages` (≤ 10) messages. An empty vec means the queue
    /// had nothing visible.
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        visibility_timeout: u32,
        wait_seconds: u32,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete up to 10 messages in one call.
    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<DeleteBatchOutcome, QueueError>;

    /// Best-effort queue depth. May lag the real state.
    async fn approximate_depth(&self, queue_url: &str) -> Result<u64, QueueError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Types
// ============================================================================

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Queue API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Batch of {size} exceeds the provider limit of 10")]
    BatchTooLarge { size: usize },
}

impl QueueError {
    /// Throttling, server faults and transport errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::Http(_) => true,
            QueueError::Api { status, code, .. } => {
                *status >= 500 || *status == 429 || code.contains("Throttl")
            }
            QueueError::InvalidResponse(_) | QueueError::BatchTooLarge { .. } => false,
        }
    }
}

/// Deletion acknowledgement for one received message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

impl From<&MessageMetadata> for DeleteEntry {
    fn from(metadata: &MessageMetadata) -> Self {
        Self {
            id: metadata.message_id.clone(),
            receipt_handle: metadata.receipt_handle.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteBatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<BatchEntryFailure>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchEntryFailure {
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// SQS wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageRequest<'a> {
    queue_url: &'a str,
    max_number_of_messages: usize,
    visibility_timeout: u32,
    wait_time_seconds: u32,
    message_attribute_names: [&'a str; 1],
    attribute_names: [&'a str; 1],
    message_system_attribute_names: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(default)]
    messages: Vec<SqsMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SqsMessage {
    message_id: String,
    receipt_handle: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: &'a [DeleteEntry],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageBatchResponse {
    #[serde(default)]
    successful: Vec<DeleteSuccess>,
    #[serde(default)]
    failed: Vec<BatchEntryFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteSuccess {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesRequest<'a> {
    queue_url: &'a str,
    attribute_names: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesResponse {
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SqsErrorResponse {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

// ============================================================================
// SqsQueueClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqsConfig {
    pub endpoint: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl SqsConfig {
    pub fn from_config(config: &DlqOpsConfig) -> Self {
        let endpoint = config
            .aws
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", config.aws.region));

        Self {
            endpoint,
            max_retries: config.retry.max_retries,
            retry_delay_ms: config.retry.retry_delay_ms,
            max_delay_ms: config.retry.max_delay_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: Client,
    config: SqsConfig,
}

impl SqsQueueClient {
    pub fn new(config: SqsConfig) -> Result<Self, QueueError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    async fn call<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp, QueueError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_millis(self.config.max_delay_ms))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::spawn(
            retry_strategy,
            || self.call_once(action, request),
            |e: &QueueError| {
                let retry = e.is_retryable();
                if retry {
                    tracing::warn!(action, error = %e, "Queue call failed, retrying");
                }
                retry
            },
        )
        .await
    }

    async fn call_once<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp, QueueError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("content-type", AMZ_JSON)
            .header("x-amz-target", format!("AmazonSQS.{}", action))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = serde_json::from_str::<SqsErrorResponse>(&error_body)
                .map(|e| (e.error_type, e.message))
                .unwrap_or_else(|_| (String::new(), error_body));

            tracing::error!(action, status = status.as_u16(), code = %code, message = %message, "Queue API error");

            return Err(QueueError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let body = response.text().await?;
        // Empty-bodied 200s happen for receives that found nothing on some gateways
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| QueueError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl QueueBackend for SqsQueueClient {
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        visibility_timeout: u32,
        wait_seconds: u32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let request = ReceiveMessageRequest {
            queue_url,
            max_number_of_messages: max_messages.clamp(1, MAX_BATCH_SIZE),
            visibility_timeout,
            wait_time_seconds: wait_seconds,
            message_attribute_names: ["All"],
            attribute_names: [APPROXIMATE_RECEIVE_COUNT],
            message_system_attribute_names: [APPROXIMATE_RECEIVE_COUNT],
        };

        let response: ReceiveMessageResponse = self.call("ReceiveMessage", &request).await?;

        Ok(response
            .messages
            .into_iter()
            .map(|m| {
                let receive_count = m
                    .attributes
                    .get(APPROXIMATE_RECEIVE_COUNT)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                let metadata = MessageMetadata {
                    message_id: m.message_id,
                    receipt_handle: m.receipt_handle,
                    receive_count,
                };
                QueueMessage::from_raw(metadata, m.body)
            })
            .collect())
    }

    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<DeleteBatchOutcome, QueueError> {
        if entries.len() > MAX_BATCH_SIZE {
            return Err(QueueError::BatchTooLarge {
                size: entries.len(),
            });
        }

        let request = DeleteMessageBatchRequest { queue_url, entries };
        let response: DeleteMessageBatchResponse =
            self.call("DeleteMessageBatch", &request).await?;

        Ok(DeleteBatchOutcome {
            successful: response.successful.into_iter().map(|s| s.id).collect(),
            failed: response.failed,
        })
    }

    async fn approximate_depth(&self, queue_url: &str) -> Result<u64, QueueError> {
        let request = GetQueueAttributesRequest {
            queue_url,
            attribute_names: [APPROXIMATE_NUMBER_OF_MESSAGES],
        };
        let response: GetQueueAttributesResponse =
            self.call("GetQueueAttributes", &request).await?;

        let raw = response
            .attributes
            .get(APPROXIMATE_NUMBER_OF_MESSAGES)
            .ok_or_else(|| {
                QueueError::InvalidResponse(format!("missing {}", APPROXIMATE_NUMBER_OF_MESSAGES))
            })?;

        raw.parse()
            .map_err(|_| QueueError::InvalidResponse(format!("bad queue depth '{}'", raw)))
    }

    fn name(&self) -> &str {
        "sqs"
    }
}

// ============================================================================
// TESTS
// ============================================================================
