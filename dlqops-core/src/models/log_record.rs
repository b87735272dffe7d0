use serde::{Deserialize, Serialize};

/// Projection of one ERROR-level log hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogRecord {
    pub message: Option<String>,
    pub service_name: Option<String>,
    pub stack_trace: String,
}

/// Earliest and latest ERROR log for one event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub first_error_log_details: ErrorLogRecord,
    pub last_error_log_details: ErrorLogRecord,
}
