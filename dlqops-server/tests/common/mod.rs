//! In-memory backends and a tempdir-backed context for server integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dlqops_core::models::{MessageMetadata, QueueMessage};
use dlqops_core::orders::{OrderStore, OrderStoreError};
use dlqops_core::queue::{DeleteBatchOutcome, DeleteEntry, QueueBackend, QueueError};
use dlqops_core::search::{LogHit, LogSearchBackend, SearchError};
use dlqops_core::DlqOpsConfig;
use dlqops_server::AppContext;
use serde_json::{json, Map, Value};

pub const ORDER_DLQ: &str = "order-queue-dlq";
pub const PAYMENT_DLQ: &str = "payment-queue-dlq";

// ============================================================================
// Messages and hits
// ============================================================================

pub fn message(message_id: &str, event_id: &str, receive_count: u32) -> QueueMessage {
    QueueMessage::from_raw(
        MessageMetadata {
            message_id: message_id.to_string(),
            receipt_handle: format!("rh-{}", message_id),
            receive_count,
        },
        json!({
            "eventId": event_id,
            "traceId": format!("t-{}", event_id),
            "eventTime": "2024-05-01T10:00:00Z",
            "type": "OrderCreated",
            "salesOrderId": "so-1"
        })
        .to_string(),
    )
}

/// `count` messages with ids `<prefix>-<n>` and event ids `e-<prefix>-<n>`.
pub fn batch(prefix: &str, start: usize, count: usize) -> Vec<QueueMessage> {
    (start..start + count)
        .map(|n| {
            message(
                &format!("{}-{}", prefix, n),
                &format!("e-{}-{}", prefix, n),
                1,
            )
        })
        .collect()
}

pub fn hit(timestamp: &str, message: &str, service: &str) -> LogHit {
    let mut source = Map::new();
    source.insert("@timestamp".to_string(), json!(timestamp));
    source.insert("message".to_string(), json!(message));
    source.insert("serviceName".to_string(), json!(service));
    source.insert("stack_trace".to_string(), json!(format!("at {}", service)));
    LogHit {
        id: format!("{}-{}", service, timestamp),
        index: "cwl-test".to_string(),
        source,
    }
}

// ============================================================================
// MockQueue
// ============================================================================

#[derive(Default)]
struct QueueScript {
    depth: u64,
    batches: VecDeque<Vec<QueueMessage>>,
    fail_receive: bool,
}

/// Queue backend keyed by queue name (the last URL segment).
#[derive(Default)]
pub struct MockQueue {
    queues: Mutex<HashMap<String, QueueScript>>,
    pub receive_calls: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    pub delete_calls: AtomicUsize,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(self, name: &str, depth: u64, batches: Vec<Vec<QueueMessage>>) -> Self {
        self.queues.lock().unwrap().insert(
            name.to_string(),
            QueueScript {
                depth,
                batches: batches.into(),
                fail_receive: false,
            },
        );
        self
    }

    pub fn failing_queue(self, name: &str, depth: u64) -> Self {
        self.queues.lock().unwrap().insert(
            name.to_string(),
            QueueScript {
                depth,
                batches: VecDeque::new(),
                fail_receive: true,
            },
        );
        self
    }

    pub fn receive_count(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    fn queue_name(queue_url: &str) -> String {
        queue_url.rsplit('/').next().unwrap_or_default().to_string()
    }
}

#[async_trait]
impl QueueBackend for MockQueue {
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        _visibility_timeout: u32,
        _wait_seconds: u32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        assert!(max_messages <= 10);
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        let mut queues = self.queues.lock().unwrap();
        let script = queues.entry(Self::queue_name(queue_url)).or_default();
        if script.fail_receive {
            return Err(QueueError::Api {
                status: 500,
                code: "InternalFailure".to_string(),
                message: "receive failed".to_string(),
            });
        }
        Ok(script.batches.pop_front().unwrap_or_default())
    }

    async fn delete_batch(
        &self,
        _queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<DeleteBatchOutcome, QueueError> {
        assert!(entries.len() <= 10);
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        self.deleted.lock().unwrap().extend(ids.iter().cloned());
        Ok(DeleteBatchOutcome {
            successful: ids,
            failed: Vec::new(),
        })
    }

    async fn approximate_depth(&self, queue_url: &str) -> Result<u64, QueueError> {
        let queues = self.queues.lock().unwrap();
        Ok(queues
            .get(&Self::queue_name(queue_url))
            .map(|s| s.depth)
            .unwrap_or(0))
    }

    fn name(&self) -> &str {
        "mock-queue"
    }
}

// ============================================================================
// MockSearch
// ============================================================================

/// Search backend returning canned hits per `eventId` phrase.
#[derive(Default)]
pub struct MockSearch {
    hits: HashMap<String, Vec<LogHit>>,
    pub queried: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, event_id: &str, hits: Vec<LogHit>) -> Self {
        self.hits.insert(event_id.to_string(), hits);
        self
    }

    pub fn queried_ids(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSearchBackend for MockSearch {
    async fn search(
        &self,
        _index: &str,
        query: &Value,
        size: u32,
    ) -> Result<Vec<LogHit>, SearchError> {
        let event_id = query["bool"]["must"]
            .as_array()
            .into_iter()
            .flatten()
            .find_map(|clause| clause["match_phrase"]["eventId"].as_str())
            .map(str::to_string);

        let Some(event_id) = event_id else {
            // Generic log queries get every canned hit
            return Ok(self.hits.values().flatten().cloned().take(size as usize).collect());
        };

        self.queried.lock().unwrap().push(event_id.clone());
        Ok(self.hits.get(&event_id).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock-search"
    }
}

// ============================================================================
// MockOrders
// ============================================================================

#[derive(Default)]
pub struct MockOrders {
    orders: HashMap<String, Value>,
}

impl MockOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, sales_order_id: &str, order: Value) -> Self {
        self.orders.insert(sales_order_id.to_string(), order);
        self
    }
}

#[async_trait]
impl OrderStore for MockOrders {
    async fn get_by_key(
        &self,
        _table: &str,
        key: &Map<String, Value>,
    ) -> Result<Option<Value>, OrderStoreError> {
        let id = key
            .get("salesOrderId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(self.orders.get(id).cloned())
    }

    fn name(&self) -> &str {
        "mock-orders"
    }
}

// ============================================================================
// Context
// ============================================================================

pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub queue: Arc<MockQueue>,
    pub search: Arc<MockSearch>,
    pub ctx: AppContext,
}

impl TestEnv {
    pub fn backup_root(&self) -> PathBuf {
        self.dir.path().join("backup")
    }

    pub fn summary_root(&self) -> PathBuf {
        self.dir.path().join("dlq-summary")
    }
}

pub fn config_toml(root: &Path, max_receive_count: u32) -> String {
    format!(
        r#"
[service]
socket_path = "{root}/dlqops.sock"
log_level = "info"
environment = "nonlive"

[aws]
region = "us-east-1"
endpoint_url = "http://localhost:4566"

[environments.nonlive]
account_id = "000000000000"
opensearch_host = "https://logs.example.com"
index_id = "idx-1"
default_view_id = "view-1"

[queue]
visibility_timeout_seconds = 30
wait_time_seconds = 0
max_drain_receives = 20

[summary]
backup_dir = "{root}/backup"
summary_dir = "{root}/dlq-summary"
max_messages_to_fetch = 50

[retry]
max_retries = 0
retry_delay_ms = 1
max_delay_ms = 1
max_receive_count = {max_receive_count}

[[dlqs]]
name = "{ORDER_DLQ}"

[[dlqs]]
name = "{PAYMENT_DLQ}"
"#,
        root = root.display(),
    )
}

pub fn load_config(root: &Path, max_receive_count: u32) -> DlqOpsConfig {
    let path = root.join("dlqops.toml");
    std::fs::write(&path, config_toml(root, max_receive_count)).unwrap();
    DlqOpsConfig::load(path.to_str().unwrap()).unwrap()
}

pub fn test_env(queue: MockQueue, search: MockSearch) -> TestEnv {
    test_env_with(queue, search, MockOrders::new(), 5)
}

pub fn test_env_with(
    queue: MockQueue,
    search: MockSearch,
    orders: MockOrders,
    max_receive_count: u32,
) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(dir.path(), max_receive_count);
    let queue = Arc::new(queue);
    let search = Arc::new(search);
    let ctx = AppContext::new(config, queue.clone(), search.clone(), Arc::new(orders)).unwrap();

    TestEnv {
        dir,
        queue,
        search,
        ctx,
    }
}

pub fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
