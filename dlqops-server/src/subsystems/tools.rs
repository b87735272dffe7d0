//! Agent tool handlers: queue inspection, error-log queries and order lookups.

use anyhow::Result;
use serde_json::{json, Map, Value};

use dlqops_core::get_items_status;
use dlqops_core::models::{PositionItemStatus, QueueMessage};
use dlqops_core::search::{match_all, term_query};

use crate::context::AppContext;

pub fn list_available_dlqs(ctx: &AppContext) -> Vec<String> {
    ctx.config.dlq_names()
}

pub async fn get_queue_message_count(ctx: &AppContext, queue_name: &str) -> Result<u64> {
    let queue_url = ctx.config.queue_url(queue_name)?;
    Ok(ctx.gateway.count_approx(&queue_url).await?)
}

/// Drain a DLQ and return its messages as `{id, ...body}`. Messages are not
/// deleted. An empty queue is not drained at all.
pub async fn fetch_dlq_messages(
    ctx: &AppContext,
    queue_name: &str,
    visibility_timeout: u32,
) -> Result<Vec<Value>> {
    let queue_url = ctx.config.queue_url(queue_name)?;
    let count = ctx.gateway.count_approx(&queue_url).await?;
    if count == 0 {
        tracing::info!(queue = %queue_name, "No messages to fetch");
        return Ok(Vec::new());
    }

    let messages = ctx.gateway.drain_all(&queue_url, visibility_timeout).await?;
    Ok(messages.iter().map(message_entry).collect())
}

fn message_entry(message: &QueueMessage) -> Value {
    let mut entry = Map::new();
    entry.insert("id".to_string(), json!(message.metadata.message_id));
    match serde_json::from_str::<Value>(&message.raw_body) {
        Ok(Value::Object(body)) => entry.extend(body),
        _ => {
            entry.insert("body".to_string(), json!(message.raw_body));
        }
    }
    Value::Object(entry)
}

/// Recent log sources from `index`, filtered on `level` when given.
///
/// Search failures come back as an empty list.
pub async fn fetch_error_logs(
    ctx: &AppContext,
    index: Option<&str>,
    level: Option<&str>,
    size: Option<u32>,
) -> Vec<Value> {
    let index = index.unwrap_or(ctx.config.search.index_pattern.as_str());
    let size = size.unwrap_or(ctx.config.search.max_hits);
    let query = match level.filter(|l| !l.trim().is_empty()) {
        Some(level) => term_query("level", &level.to_uppercase()),
        None => match_all(),
    };

    let backend = ctx.correlation.backend();
    match backend.search(index, &query, size).await {
        Ok(hits) => hits.into_iter().map(|hit| Value::Object(hit.source)).collect(),
        Err(e) => {
            tracing::error!(index, backend = backend.name(), error = %e, "Log query failed");
            Vec::new()
        }
    }
}

pub async fn get_order_items_status(
    ctx: &AppContext,
    sales_order_id: &str,
    item_ids: &[String],
) -> Vec<PositionItemStatus> {
    get_items_status(
        ctx.orders.as_ref(),
        &ctx.config.orders.table_name,
        sales_order_id,
        item_ids,
    )
    .await
}
