use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::log_record::{EnrichmentResult, ErrorLogRecord};
use super::message::QueueMessage;

/// Lightweight projection of a drained message, accumulated while draining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub message_id: String,
    pub event_id: Option<String>,
    pub trace_id: Option<String>,
    pub event_time: Option<Value>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub receive_count: u32,
    pub raw_body: String,
}

impl From<&QueueMessage> for SummaryRow {
    fn from(msg: &QueueMessage) -> Self {
        Self {
            message_id: msg.metadata.message_id.clone(),
            event_id: msg.event_id().map(str::to_string),
            trace_id: msg.body.trace_id.clone(),
            event_time: msg.body.event_time.clone(),
            event_type: msg.body.event_type.clone(),
            receive_count: msg.metadata.receive_count,
            raw_body: msg.raw_body.clone(),
        }
    }
}

/// One line of the DLQ summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub row: SummaryRow,
    pub first_error_log_details: Option<ErrorLogRecord>,
    pub last_error_log_details: Option<ErrorLogRecord>,
    pub search_by_event_id: String,
    pub search_by_trace_id: String,
}

impl EnrichedRecord {
    /// Summary columns, in artifact order. Nested log details are flattened with
    /// dotted names so rows without logs still get (empty) cells.
    pub const COLUMNS: &'static [&'static str] = &[
        "messageId",
        "eventId",
        "traceId",
        "eventTime",
        "type",
        "receiveCount",
        "rawBody",
        "firstErrorLogDetails.message",
        "firstErrorLogDetails.serviceName",
        "firstErrorLogDetails.stackTrace",
        "lastErrorLogDetails.message",
        "lastErrorLogDetails.serviceName",
        "lastErrorLogDetails.stackTrace",
        "searchByEventId",
        "searchByTraceId",
    ];

    pub fn new(
        row: SummaryRow,
        result: Option<&EnrichmentResult>,
        search_by_event_id: String,
        search_by_trace_id: String,
    ) -> Self {
        Self {
            row,
            first_error_log_details: result.map(|r| r.first_error_log_details.clone()),
            last_error_log_details: result.map(|r| r.last_error_log_details.clone()),
            search_by_event_id,
            search_by_trace_id,
        }
    }
}
