//! Queue gateway: draining and chunked deletion on top of a `QueueBackend`.
//!
//! Draining never deletes. Messages stay on the queue and reappear once their
//! visibility timeout expires, unless acknowledged through `delete_acknowledged`.

use std::sync::Arc;

use futures::future::join_all;

use crate::models::QueueMessage;
use crate::queue::{DeleteEntry, QueueBackend, QueueError, MAX_BATCH_SIZE};

/// Result of a best-effort chunked deletion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletionReport {
    pub chunks_attempted: usize,
    pub chunks_failed: usize,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct QueueGateway {
    backend: Arc<dyn QueueBackend>,
    wait_seconds: u32,
}

impl QueueGateway {
    pub fn new(backend: Arc<dyn QueueBackend>, wait_seconds: u32) -> Self {
        Self {
            backend,
            wait_seconds,
        }
    }

    /// One receive call of at most 10 messages.
    pub async fn receive_batch(
        &self,
        queue_url: &str,
        visibility_timeout: u32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.backend
            .receive(queue_url, MAX_BATCH_SIZE, visibility_timeout, self.wait_seconds)
            .await
    }

    /// Receive until a call comes back empty.
    ///
    /// Does not terminate while a producer keeps the queue non-empty; use
    /// `drain_bounded` when the caller needs a ceiling.
    pub async fn drain_all(
        &self,
        queue_url: &str,
        visibility_timeout: u32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.drain(queue_url, visibility_timeout, None).await
    }

    /// Like `drain_all`, but stops after `max_receives` receive calls.
    pub async fn drain_bounded(
        &self,
        queue_url: &str,
        visibility_timeout: u32,
        max_receives: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.drain(queue_url, visibility_timeout, Some(max_receives))
            .await
    }

    async fn drain(
        &self,
        queue_url: &str,
        visibility_timeout: u32,
        max_receives: Option<usize>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut messages = Vec::new();
        let mut receives = 0usize;

        loop {
            if max_receives.is_some_and(|max| receives >= max) {
                tracing::warn!(
                    queue_url,
                    receives,
                    drained = messages.len(),
                    "Drain stopped at receive limit before the queue was empty"
                );
                break;
            }

            tracing::debug!(queue_url, "Fetching messages");
            let batch = self.receive_batch(queue_url, visibility_timeout).await?;
            receives += 1;

            if batch.is_empty() {
                break;
            }
            messages.extend(batch);
        }

        tracing::info!(queue_url, receives, drained = messages.len(), "Drain complete");
        Ok(messages)
    }

    pub async fn count_approx(&self, queue_url: &str) -> Result<u64, QueueError> {
        self.backend.approximate_depth(queue_url).await
    }

    /// Delete in chunks of 10, one backend call per chunk. A failing chunk is logged
    /// and recorded; the remaining chunks still run.
    pub async fn delete_acknowledged(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> DeletionReport {
        let mut report = DeletionReport::default();
        if entries.is_empty() {
            return report;
        }

        let chunks: Vec<&[DeleteEntry]> = entries.chunks(MAX_BATCH_SIZE).collect();
        report.chunks_attempted = chunks.len();

        let results = join_all(
            chunks
                .iter()
                .map(|chunk| self.backend.delete_batch(queue_url, chunk)),
        )
        .await;

        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    if !outcome.failed.is_empty() {
                        report.chunks_failed += 1;
                        for failure in &outcome.failed {
                            tracing::error!(
                                queue_url,
                                message_id = %failure.id,
                                code = %failure.code,
                                "Message deletion rejected"
                            );
                        }
                    }
                    report.deleted.extend(outcome.successful);
                    report
                        .failed
                        .extend(outcome.failed.into_iter().map(|f| f.id));
                }
                Err(e) => {
                    report.chunks_failed += 1;
                    tracing::error!(
                        queue_url,
                        entries = chunk.len(),
                        error = %e,
                        "Deletion chunk failed; messages will redrive"
                    );
                    report.failed.extend(chunk.iter().map(|entry| entry.id.clone()));
                }
            }
        }

        tracing::info!(
            queue_url,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Deletion finished"
        );
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageMetadata;
    use crate::queue::DeleteBatchOutcome;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend that replays scripted receive batches and records delete calls.
    struct ScriptedBackend {
        batches: Mutex<VecDeque<usize>>,
        receive_calls: AtomicUsize,
        delete_calls: Mutex<Vec<usize>>,
        fail_delete_call: Option<usize>,
        next_id: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(batches: Vec<usize>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                receive_calls: AtomicUsize::new(0),
                delete_calls: Mutex::new(Vec::new()),
                fail_delete_call: None,
                next_id: AtomicUsize::new(0),
            }
        }

        fn failing_delete_on(mut self, call_index: usize) -> Self {
            self.fail_delete_call = Some(call_index);
            self
        }
    }

    #[async_trait]
    impl QueueBackend for ScriptedBackend {
        async fn receive(
            &self,
            _queue_url: &str,
            max_messages: usize,
            _visibility_timeout: u32,
            _wait_seconds: u32,
        ) -> Result<Vec<QueueMessage>, QueueError> {
            assert!(max_messages <= MAX_BATCH_SIZE);
            self.receive_calls.fetch_add(1, Ordering::SeqCst);
            // An exhausted script behaves like a queue that keeps refilling
            let size = self.batches.lock().unwrap().pop_front().unwrap_or(1);
            Ok((0..size)
                .map(|_| {
                    let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                    QueueMessage::from_raw(
                        MessageMetadata {
                            message_id: format!("m-{}", n),
                            receipt_handle: format!("rh-{}", n),
                            receive_count: 1,
                        },
                        format!("{{\"eventId\":\"e-{}\"}}", n),
                    )
                })
                .collect())
        }

        async fn delete_batch(
            &self,
            _queue_url: &str,
            entries: &[DeleteEntry],
        ) -> Result<DeleteBatchOutcome, QueueError> {
            let call_index = {
                let mut calls = self.delete_calls.lock().unwrap();
                calls.push(entries.len());
                calls.len() - 1
            };
            if self.fail_delete_call == Some(call_index) {
                return Err(QueueError::Api {
                    status: 500,
                    code: "InternalFailure".to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(DeleteBatchOutcome {
                successful: entries.iter().map(|e| e.id.clone()).collect(),
                failed: Vec::new(),
            })
        }

        async fn approximate_depth(&self, _queue_url: &str) -> Result<u64, QueueError> {
            Ok(0)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn entries(n: usize) -> Vec<DeleteEntry> {
        (0..n)
            .map(|i| DeleteEntry {
                id: format!("m-{}", i),
                receipt_handle: format!("rh-{}", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_drain_all_stops_on_first_empty_receive() {
        let backend = Arc::new(ScriptedBackend::new(vec![10, 10, 3, 0, 5]));
        let gateway = QueueGateway::new(backend.clone(), 0);

        let messages = gateway.drain_all("q", 30).await.unwrap();

        assert_eq!(messages.len(), 23);
        assert_eq!(backend.receive_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_drain_bounded_caps_receive_calls() {
        // Script runs out after two batches and then refills forever
        let backend = Arc::new(ScriptedBackend::new(vec![10, 10]));
        let gateway = QueueGateway::new(backend.clone(), 0);

        let messages = gateway.drain_bounded("q", 30, 5).await.unwrap();

        assert_eq!(backend.receive_calls.load(Ordering::SeqCst), 5);
        assert_eq!(messages.len(), 23);
    }

    #[tokio::test]
    async fn test_delete_acknowledged_chunks_by_ten() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let gateway = QueueGateway::new(backend.clone(), 0);

        let report = gateway.delete_acknowledged("q", &entries(23)).await;

        assert_eq!(*backend.delete_calls.lock().unwrap(), vec![10, 10, 3]);
        assert_eq!(report.chunks_attempted, 3);
        assert_eq!(report.chunks_failed, 0);
        assert_eq!(report.deleted.len(), 23);
    }

    #[tokio::test]
    async fn test_delete_acknowledged_continues_after_failed_chunk() {
        let backend = Arc::new(ScriptedBackend::new(vec![]).failing_delete_on(1));
        let gateway = QueueGateway::new(backend.clone(), 0);

        let report = gateway.delete_acknowledged("q", &entries(23)).await;

        assert_eq!(backend.delete_calls.lock().unwrap().len(), 3);
        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.deleted.len(), 13);
        assert_eq!(report.failed.len(), 10);
        assert!(report.failed.contains(&"m-10".to_string()));
        assert!(report.failed.contains(&"m-19".to_string()));
    }

    #[tokio::test]
    async fn test_delete_acknowledged_with_no_entries_makes_no_calls() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let gateway = QueueGateway::new(backend.clone(), 0);

        let report = gateway.delete_acknowledged("q", &[]).await;

        assert!(backend.delete_calls.lock().unwrap().is_empty());
        assert_eq!(report, DeletionReport::default());
    }
}
