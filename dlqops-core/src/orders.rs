//! Order store lookups
//!
//! `OrderStore` is a point lookup by key. `DynamoDbOrderStore` issues `GetItem`
//! over the DynamoDB JSON protocol and unmarshalls the typed attribute values into
//! plain JSON.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::DlqOpsConfig;
use crate::models::PositionItemStatus;

const AMZ_JSON: &str = "application/x-amz-json-1.0";

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetch one item. `Ok(None)` when no item has this key.
    async fn get_by_key(
        &self,
        table: &str,
        key: &Map<String, Value>,
    ) -> Result<Option<Value>, OrderStoreError>;

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum OrderStoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Order store API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unsupported key value for {0}")]
    UnsupportedKey(String),
}

impl OrderStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            OrderStoreError::Http(_) => true,
            OrderStoreError::Api { status, code, .. } => {
                *status >= 500 || code.contains("Throughput") || code.contains("Throttl")
            }
            OrderStoreError::UnsupportedKey(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetItemResponse {
    #[serde(rename = "Item")]
    item: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct DynamoErrorResponse {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct DynamoDbOrderStore {
    client: Client,
    endpoint: String,
    max_retries: usize,
    retry_delay_ms: u64,
    max_delay_ms: u64,
}

impl DynamoDbOrderStore {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, OrderStoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            max_delay_ms: 10_000,
        })
    }

    pub fn from_config(config: &DlqOpsConfig) -> Result<Self, OrderStoreError> {
        let endpoint = config.aws.endpoint_url.clone().unwrap_or_else(|| {
            format!("https://dynamodb.{}.amazonaws.com", config.aws.region)
        });
        let mut store = Self::new(endpoint)?;
        store.max_retries = config.retry.max_retries;
        store.retry_delay_ms = config.retry.retry_delay_ms;
        store.max_delay_ms = config.retry.max_delay_ms;
        Ok(store)
    }

    async fn get_item_once(&self, body: &Value) -> Result<Option<Value>, OrderStoreError> {
        let response = self
            .client
            .post(format!("{}/", self.endpoint))
            .header("content-type", AMZ_JSON)
            .header("x-amz-target", "DynamoDB_20120810.GetItem")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = serde_json::from_str::<DynamoErrorResponse>(&error_body)
                .map(|e| (e.error_type, e.message))
                .unwrap_or_else(|_| (String::new(), error_body));
            return Err(OrderStoreError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let parsed: GetItemResponse = response.json().await?;
        Ok(parsed.item.map(|item| unmarshall_item(&item)))
    }
}

#[async_trait]
impl OrderStore for DynamoDbOrderStore {
    async fn get_by_key(
        &self,
        table: &str,
        key: &Map<String, Value>,
    ) -> Result<Option<Value>, OrderStoreError> {
        let mut typed_key = Map::new();
        for (name, value) in key {
            typed_key.insert(name.clone(), marshall_key_value(name, value)?);
        }
        let body = json!({ "TableName": table, "Key": typed_key });

        let retry_strategy = ExponentialBackoff::from_millis(self.retry_delay_ms)
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(
            retry_strategy,
            || self.get_item_once(&body),
            OrderStoreError::is_retryable,
        )
        .await
    }

    fn name(&self) -> &str {
        "dynamodb"
    }
}

fn marshall_key_value(name: &str, value: &Value) -> Result<Value, OrderStoreError> {
    match value {
        Value::String(s) => Ok(json!({ "S": s })),
        Value::Number(n) => Ok(json!({ "N": n.to_string() })),
        _ => Err(OrderStoreError::UnsupportedKey(name.to_string())),
    }
}

fn unmarshall_item(item: &Map<String, Value>) -> Value {
    Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), unmarshall(v)))
            .collect(),
    )
}

/// Convert a DynamoDB attribute value (`{"S": ..}`, `{"M": ..}`, ...) to JSON.
pub fn unmarshall(attribute: &Value) -> Value {
    let Some((kind, inner)) = attribute.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };

    match (kind.as_str(), inner) {
        ("S", v) => v.clone(),
        ("N", Value::String(n)) => n
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| n.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number))
            .unwrap_or(Value::Null),
        ("BOOL", v) => v.clone(),
        ("NULL", _) => Value::Null,
        ("M", Value::Object(map)) => unmarshall_item(map),
        ("L", Value::Array(items)) => Value::Array(items.iter().map(unmarshall).collect()),
        ("SS", v) | ("BS", v) | ("B", v) => v.clone(),
        ("NS", Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|n| unmarshall(&json!({ "N": n })))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Status of the requested position items of an order.
///
/// Any store failure, a missing order or a malformed order yields an empty list;
/// the failure is logged with the sales order id.
pub async fn get_items_status(
    store: &dyn OrderStore,
    table: &str,
    sales_order_id: &str,
    item_ids: &[String],
) -> Vec<PositionItemStatus> {
    let mut key = Map::new();
    key.insert("salesOrderId".to_string(), json!(sales_order_id));

    let order = match store.get_by_key(table, &key).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            tracing::warn!(sales_order_id, table, "Order not found");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(sales_order_id, table, error = %e, "Unable to fetch order");
            return Vec::new();
        }
    };

    let Some(positions) = order.get("positions").and_then(Value::as_array) else {
        tracing::warn!(sales_order_id, "Order has no positions");
        return Vec::new();
    };

    positions
        .iter()
        .filter_map(|p| p.get("positionItems").and_then(Value::as_array))
        .flatten()
        .filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str)?;
            item_ids.iter().any(|wanted| wanted == id).then(|| PositionItemStatus {
                position_item_id: id.to_string(),
                status: item.get("status").and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
