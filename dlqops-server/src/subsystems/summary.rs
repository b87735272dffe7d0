//! DLQ summary pipeline
//!
//! Per queue: count, drain up to the cap while backing up every raw body, resolve
//! first/last ERROR logs for the distinct event ids, join, and write a CSV summary.
//! Nothing is deleted from the queue.
//!
//! Queues run concurrently and are isolated from each other: a failing queue is
//! reported with the stage it failed in and does not affect its siblings.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Timelike, Utc};
use futures::future::join_all;
use serde::Serialize;

use dlqops_core::models::{EnrichedRecord, SummaryRow};

use crate::context::AppContext;
use crate::subsystems::backup::{backup_dir, BackupWriter};

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Counting,
    Draining,
    BackingUp,
    Correlating,
    Writing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRunError {
    pub stage: PipelineStage,
    pub message: String,
}

/// Outcome of one queue's run.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub queue_name: String,
    pub approximate_count: u64,
    pub stage: PipelineStage,
    pub backups_written: usize,
    pub records: Vec<EnrichedRecord>,
    pub artifact: Option<PathBuf>,
    pub error: Option<QueueRunError>,
}

impl QueueSummary {
    fn new(queue_name: &str) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            approximate_count: 0,
            stage: PipelineStage::Idle,
            backups_written: 0,
            records: Vec::new(),
            artifact: None,
            error: None,
        }
    }

    fn fail(mut self, stage: PipelineStage, message: impl std::fmt::Display) -> Self {
        tracing::error!(
            queue = %self.queue_name,
            stage = ?stage,
            error = %message,
            "Queue summary failed"
        );
        self.stage = stage;
        self.error = Some(QueueRunError {
            stage,
            message: message.to_string(),
        });
        self
    }

    pub fn is_empty_queue(&self) -> bool {
        self.error.is_none() && self.approximate_count == 0
    }
}

/// Summarize every configured DLQ. Queues reporting zero messages are left out.
pub async fn run_summary_for_all_queues(
    ctx: &AppContext,
    max_messages_to_fetch: usize,
) -> Vec<QueueSummary> {
    run_summary_at(ctx, max_messages_to_fetch, Utc::now()).await
}

/// `run_summary_for_all_queues` with an explicit clock, used for artifact names.
pub async fn run_summary_at(
    ctx: &AppContext,
    max_messages_to_fetch: usize,
    now: DateTime<Utc>,
) -> Vec<QueueSummary> {
    let names = ctx.config.dlq_names();
    tracing::info!(queues = names.len(), max_messages_to_fetch, "Starting DLQ summary");

    let summaries = join_all(
        names
            .iter()
            .map(|name| summarize_queue(ctx, name, max_messages_to_fetch, now)),
    )
    .await;

    let summaries: Vec<QueueSummary> = summaries
        .into_iter()
        .filter(|s| !s.is_empty_queue())
        .collect();

    tracing::info!(
        queues_with_messages = summaries.len(),
        failed = summaries.iter().filter(|s| s.error.is_some()).count(),
        "DLQ summary finished"
    );
    summaries
}

pub async fn summarize_queue(
    ctx: &AppContext,
    queue_name: &str,
    max_messages_to_fetch: usize,
    now: DateTime<Utc>,
) -> QueueSummary {
    let mut summary = QueueSummary::new(queue_name);

    // Counting
    summary.stage = PipelineStage::Counting;
    let queue_url = match ctx.config.queue_url(queue_name) {
        Ok(url) => url,
        Err(e) => return summary.fail(PipelineStage::Counting, e),
    };
    summary.approximate_count = match ctx.gateway.count_approx(&queue_url).await {
        Ok(count) => count,
        Err(e) => return summary.fail(PipelineStage::Counting, e),
    };
    if summary.approximate_count == 0 {
        tracing::debug!(queue = %queue_name, "Queue is empty");
        summary.stage = PipelineStage::Done;
        return summary;
    }

    let max_message = summary
        .approximate_count
        .min(max_messages_to_fetch as u64) as usize;
    tracing::info!(
        queue = %queue_name,
        approximate_count = summary.approximate_count,
        max_message,
        "Summarizing queue"
    );

    // Draining + BackingUp
    let root = Path::new(&ctx.config.summary.backup_dir);
    let mut backups = BackupWriter::new(&ctx.artifacts, backup_dir(root, queue_name, now));
    let mut rows: Vec<SummaryRow> = Vec::new();
    let visibility = ctx.config.queue.visibility_timeout_seconds;

    loop {
        summary.stage = PipelineStage::Draining;
        let batch = match ctx.gateway.receive_batch(&queue_url, visibility).await {
            Ok(batch) => batch,
            Err(e) => {
                summary.backups_written = backups.written();
                return summary.fail(PipelineStage::Draining, e);
            }
        };
        if batch.is_empty() {
            break;
        }

        summary.stage = PipelineStage::BackingUp;
        for message in &batch {
            if let Err(e) = backups.write(message).await {
                tracing::error!(
                    queue = %queue_name,
                    event_id = message.event_id().unwrap_or(""),
                    message_id = %message.metadata.message_id,
                    "Backup write failed"
                );
                summary.backups_written = backups.written();
                return summary.fail(PipelineStage::BackingUp, e);
            }
            rows.push(SummaryRow::from(message));
        }

        // The cap is checked per batch, so the last batch may overshoot it
        if rows.len() >= max_message {
            break;
        }
    }
    summary.backups_written = backups.written();

    // Correlating
    summary.stage = PipelineStage::Correlating;
    let brackets = ctx
        .correlation
        .resolve_error_brackets(rows.iter().filter_map(|r| r.event_id.as_deref()))
        .await;

    summary.records = rows
        .into_iter()
        .map(|row| {
            let result = row
                .event_id
                .as_deref()
                .and_then(|id| brackets.get(id))
                .and_then(Option::as_ref);
            let by_event = ctx.links.by_event_id(row.event_id.as_deref());
            let by_trace = ctx.links.by_trace_id(row.trace_id.as_deref());
            EnrichedRecord::new(row, result, by_event, by_trace)
        })
        .collect();

    // Writing
    summary.stage = PipelineStage::Writing;
    let path = summary_path(
        Path::new(&ctx.config.summary.summary_dir),
        queue_name,
        ctx.environment(),
        now,
    );
    if let Err(e) = ctx
        .artifacts
        .write_table(&path, EnrichedRecord::COLUMNS, &summary.records)
        .await
    {
        return summary.fail(PipelineStage::Writing, e);
    }

    summary.artifact = Some(path);
    summary.stage = PipelineStage::Done;
    tracing::info!(
        queue = %queue_name,
        records = summary.records.len(),
        backups = summary.backups_written,
        "Queue summary written"
    );
    summary
}

/// `<root>/<queue>-<env>-<yyyy-mm-dd>-<h-m-s>.csv`, time fields not zero-padded.
pub fn summary_path(root: &Path, queue_name: &str, env: &str, now: DateTime<Utc>) -> PathBuf {
    root.join(format!(
        "{}-{}-{}-{}-{}-{}.csv",
        queue_name,
        env,
        now.format("%Y-%m-%d"),
        now.hour(),
        now.minute(),
        now.second()
    ))
}

// ============================================================================
// TESTS
// ============================================================================
