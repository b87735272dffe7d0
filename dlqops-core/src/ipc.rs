use serde::{Deserialize, Serialize};

fn default_visibility_timeout() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OpsRequest {
    Ping,
    Health,
    ListAvailableDlqs,
    GetQueueMessageCount {
        queue_name: String,
    },
    FetchDlqMessages {
        queue_name: String,
        #[serde(default = "default_visibility_timeout")]
        visibility_timeout: u32,
    },
    FetchErrorLogs {
        index: Option<String>,
        level: Option<String>,
        size: Option<u32>,
    },
    GenerateDlqSummary {
        max_messages: Option<usize>,
    },
    ResolveErrorBrackets {
        event_ids: Vec<String>,
    },
    GetOrderItemsStatus {
        sales_order_id: String,
        item_ids: Vec<String>,
    },
    ArchiveDlq {
        queue_name: String,
        #[serde(default = "default_visibility_timeout")]
        visibility_timeout: u32,
        /// Delete every backed-up message, not only those past the redrive limit.
        #[serde(default)]
        delete: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpsResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl OpsResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
