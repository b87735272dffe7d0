//! Raw message backups: `<backup_dir>/<queue>/<yyyy-mm-dd>/<eventId>.json`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dlqops_core::models::message::file_stem;
use dlqops_core::models::QueueMessage;
use dlqops_core::{ArtifactError, ArtifactWriter};

/// Directory holding one day's backups for a queue.
pub fn backup_dir(root: &Path, queue_name: &str, now: DateTime<Utc>) -> PathBuf {
    root.join(queue_name).join(now.format("%Y-%m-%d").to_string())
}

/// Writes raw bodies into one backup directory, created on the first write.
///
/// Messages sharing an event id each keep their own file. The lowest message id owns
/// `<eventId>.json` and the others are written to `<eventId>-<messageId>.json`, so the
/// final layout does not depend on delivery order and reruns overwrite in place.
pub struct BackupWriter<'a> {
    artifacts: &'a ArtifactWriter,
    dir: PathBuf,
    /// Backup key -> message id currently holding the plain file name.
    owners: HashMap<String, String>,
    files: HashSet<String>,
    dir_ready: bool,
}

impl<'a> BackupWriter<'a> {
    pub fn new(artifacts: &'a ArtifactWriter, dir: PathBuf) -> Self {
        Self {
            artifacts,
            dir,
            owners: HashMap::new(),
            files: HashSet::new(),
            dir_ready: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Distinct backup files written so far.
    pub fn written(&self) -> usize {
        self.files.len()
    }

    pub async fn write(&mut self, message: &QueueMessage) -> Result<PathBuf, ArtifactError> {
        if !self.dir_ready {
            self.artifacts.ensure_dir(&self.dir).await?;
            self.dir_ready = true;
        }

        let key = message.backup_key();
        let message_id = message.metadata.message_id.as_str();

        let name = match self.owners.get(&key).cloned() {
            None => {
                self.owners.insert(key.clone(), message_id.to_string());
                key
            }
            Some(owner) if owner == message_id => key,
            Some(owner) if message_id < owner.as_str() => {
                let displaced = suffixed(&key, &owner);
                self.artifacts
                    .move_file(&self.path(&key), &self.path(&displaced))
                    .await?;
                tracing::debug!(key = %key, message_id = %owner, "Backup moved to suffixed name");
                self.files.insert(displaced);
                self.owners.insert(key.clone(), message_id.to_string());
                key
            }
            Some(_) => suffixed(&key, message_id),
        };

        let path = self.path(&name);
        self.artifacts
            .write_file(&path, message.raw_body.as_bytes())
            .await?;
        self.files.insert(name);
        Ok(path)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

fn suffixed(key: &str, message_id: &str) -> String {
    format!("{}-{}", key, file_stem(message_id))
}
