use chrono::Utc;
use dlqops_core::ipc::{OpsRequest, OpsResponse};
use serde_json::json;

use crate::context::AppContext;
use crate::subsystems::{archive, summary, tools};

pub async fn handle_request(request: OpsRequest, ctx: &AppContext) -> OpsResponse {
    match request {
        OpsRequest::Ping => OpsResponse::pong(),
        OpsRequest::Health => OpsResponse::ok(health_status(ctx)),
        OpsRequest::ListAvailableDlqs => {
            let dlqs = tools::list_available_dlqs(ctx);
            OpsResponse::ok(json!({ "count": dlqs.len(), "dlqs": dlqs }))
        }
        OpsRequest::GetQueueMessageCount { queue_name } => {
            match tools::get_queue_message_count(ctx, &queue_name).await {
                Ok(count) => OpsResponse::ok(json!({
                    "queue_name": queue_name,
                    "approximate_count": count,
                })),
                Err(e) => OpsResponse::err(format!("{:#}", e)),
            }
        }
        OpsRequest::FetchDlqMessages {
            queue_name,
            visibility_timeout,
        } => match tools::fetch_dlq_messages(ctx, &queue_name, visibility_timeout).await {
            Ok(messages) => OpsResponse::ok(json!({
                "queue_name": queue_name,
                "count": messages.len(),
                "messages": messages,
            })),
            Err(e) => OpsResponse::err(format!("{:#}", e)),
        },
        OpsRequest::FetchErrorLogs { index, level, size } => {
            let logs =
                tools::fetch_error_logs(ctx, index.as_deref(), level.as_deref(), size).await;
            OpsResponse::ok(json!({ "count": logs.len(), "logs": logs }))
        }
        OpsRequest::GenerateDlqSummary { max_messages } => {
            let max = max_messages.unwrap_or(ctx.config.summary.max_messages_to_fetch);
            let queues = summary::run_summary_for_all_queues(ctx, max).await;
            OpsResponse::ok(json!({
                "queues": queues.len(),
                "failed": queues.iter().filter(|q| q.error.is_some()).count(),
                "summaries": queues,
            }))
        }
        OpsRequest::ResolveErrorBrackets { event_ids } => {
            let brackets = ctx.correlation.resolve_error_brackets(&event_ids).await;
            OpsResponse::ok(json!({ "count": brackets.len(), "brackets": brackets }))
        }
        OpsRequest::GetOrderItemsStatus {
            sales_order_id,
            item_ids,
        } => {
            let items = tools::get_order_items_status(ctx, &sales_order_id, &item_ids).await;
            OpsResponse::ok(json!({
                "sales_order_id": sales_order_id,
                "items": items,
            }))
        }
        OpsRequest::ArchiveDlq {
            queue_name,
            visibility_timeout,
            delete,
        } => match archive::archive_queue(ctx, &queue_name, visibility_timeout, delete, Utc::now())
            .await
        {
            Ok(report) => OpsResponse::ok(json!(report)),
            Err(e) => OpsResponse::err(format!("{:#}", e)),
        },
    }
}

pub fn health_status(ctx: &AppContext) -> serde_json::Value {
    json!({
        "status": "healthy",
        "environment": ctx.environment(),
        "dlqs": ctx.config.dlqs.len(),
        "search_backend": ctx.correlation.backend().name(),
        "order_store": ctx.orders.name(),
    })
}
