//! Archive flow: back up a DLQ, then delete what has been backed up.
//!
//! Every drained body is written to the backup directory before any deletion is
//! attempted. If a single backup fails nothing is deleted and the messages redrive
//! once their visibility timeout expires.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use dlqops_core::queue::DeleteEntry;
use dlqops_core::DeletionReport;

use crate::context::AppContext;
use crate::subsystems::backup::{backup_dir, BackupWriter};

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub queue_name: String,
    pub drained: usize,
    pub backed_up: usize,
    pub backup_dir: PathBuf,
    /// Messages selected for deletion.
    pub eligible: usize,
    pub deleted: Vec<String>,
    pub delete_failed: Vec<String>,
    pub chunks_failed: usize,
}

impl ArchiveReport {
    fn with_deletion(mut self, deletion: DeletionReport) -> Self {
        self.deleted = deletion.deleted;
        self.delete_failed = deletion.failed;
        self.chunks_failed = deletion.chunks_failed;
        self
    }
}

/// Archive `queue_name`.
///
/// Without `delete_all`, only messages received at least `retry.max_receive_count`
/// times are deleted; the rest stay on the queue for another redrive.
pub async fn archive_queue(
    ctx: &AppContext,
    queue_name: &str,
    visibility_timeout: u32,
    delete_all: bool,
    now: DateTime<Utc>,
) -> Result<ArchiveReport> {
    let queue_url = ctx.config.queue_url(queue_name)?;
    let messages = ctx
        .gateway
        .drain_bounded(
            &queue_url,
            visibility_timeout,
            ctx.config.queue.max_drain_receives,
        )
        .await
        .with_context(|| format!("draining {}", queue_name))?;

    let dir = backup_dir(Path::new(&ctx.config.summary.backup_dir), queue_name, now);
    let mut backups = BackupWriter::new(&ctx.artifacts, dir.clone());
    for message in &messages {
        backups.write(message).await.with_context(|| {
            format!(
                "backing up message {} from {}; nothing was deleted",
                message.metadata.message_id, queue_name
            )
        })?;
    }

    let max_receive_count = ctx.config.retry.max_receive_count;
    let entries: Vec<DeleteEntry> = messages
        .iter()
        .filter(|m| delete_all || m.metadata.receive_count >= max_receive_count)
        .map(|m| DeleteEntry::from(&m.metadata))
        .collect();

    tracing::info!(
        queue = %queue_name,
        drained = messages.len(),
        eligible = entries.len(),
        delete_all,
        "Backups written; deleting archived messages"
    );

    let report = ArchiveReport {
        queue_name: queue_name.to_string(),
        drained: messages.len(),
        backed_up: backups.written(),
        backup_dir: dir,
        eligible: entries.len(),
        deleted: Vec::new(),
        delete_failed: Vec::new(),
        chunks_failed: 0,
    };

    let deletion = ctx.gateway.delete_acknowledged(&queue_url, &entries).await;
    Ok(report.with_deletion(deletion))
}
