//! Log correlation: event id → first/last ERROR log bracket.
//!
//! Ids are looked up in groups of `group_size`; groups run one after another and
//! the ids inside a group run concurrently, which bounds in-flight queries against
//! the search backend. A failed lookup is logged and treated as "no logs".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;

use crate::config::DlqOpsConfig;
use crate::models::{EnrichmentResult, ErrorLogRecord};
use crate::search::{LogFilter, LogHit, LogSearchBackend};

pub const DEFAULT_GROUP_SIZE: usize = 5;
pub const DEFAULT_STACK_TRACE_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    pub index: String,
    pub max_hits: u32,
    pub group_size: usize,
    pub stack_trace_limit: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            index: "cwl*".to_string(),
            max_hits: 50,
            group_size: DEFAULT_GROUP_SIZE,
            stack_trace_limit: DEFAULT_STACK_TRACE_LIMIT,
        }
    }
}

impl From<&DlqOpsConfig> for CorrelationConfig {
    fn from(config: &DlqOpsConfig) -> Self {
        Self {
            index: config.search.index_pattern.clone(),
            max_hits: config.search.max_hits,
            group_size: config.search.lookup_group_size.max(1),
            stack_trace_limit: config.search.stack_trace_limit,
        }
    }
}

#[derive(Clone)]
pub struct LogCorrelationClient {
    backend: Arc<dyn LogSearchBackend>,
    config: CorrelationConfig,
}

impl LogCorrelationClient {
    pub fn new(backend: Arc<dyn LogSearchBackend>, config: CorrelationConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<dyn LogSearchBackend> {
        &self.backend
    }

    /// Resolve every distinct id to its ERROR bracket. The map has one key per
    /// distinct id, including ids with no logs (`None`). An empty id is never
    /// queried and maps to `None`.
    pub async fn resolve_error_brackets<I, S>(
        &self,
        event_ids: I,
    ) -> HashMap<String, Option<EnrichmentResult>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (ids, blank): (Vec<String>, Vec<String>) = distinct_ids(event_ids)
            .into_iter()
            .partition(|id| !id.is_empty());
        let groups = lookup_groups(&ids, self.config.group_size);
        let mut brackets = HashMap::with_capacity(ids.len() + blank.len());
        brackets.extend(blank.into_iter().map(|id| (id, None)));

        tracing::info!(
            event_ids = ids.len(),
            groups = groups.len(),
            "Resolving error log brackets"
        );

        for group in groups {
            let results = join_all(group.iter().map(|id| self.bracket_for(id))).await;
            brackets.extend(group.iter().cloned().zip(results));
        }

        brackets
    }

    /// First and last ERROR log for one event id.
    pub async fn bracket_for(&self, event_id: &str) -> Option<EnrichmentResult> {
        let hits = self.error_logs(event_id).await;
        let first = hits.first()?;
        let last = hits.last()?;

        Some(EnrichmentResult {
            first_error_log_details: self.project(first),
            last_error_log_details: self.project(last),
        })
    }

    /// ERROR logs for an event id in ascending timestamp order. Backend failures
    /// come back as an empty list.
    pub async fn error_logs(&self, event_id: &str) -> Vec<LogHit> {
        let query = LogFilter::new()
            .field("eventId", event_id)
            .field("level", "ERROR")
            .to_query();

        match self
            .backend
            .search(&self.config.index, &query, self.config.max_hits)
            .await
        {
            Ok(hits) => sort_by_timestamp(hits),
            Err(e) => {
                tracing::error!(
                    event_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Error log lookup failed; treating as no logs"
                );
                Vec::new()
            }
        }
    }

    fn project(&self, hit: &LogHit) -> ErrorLogRecord {
        ErrorLogRecord {
            message: hit.field_str("message").map(str::to_string),
            service_name: hit.field_str("serviceName").map(str::to_string),
            stack_trace: hit
                .field_str("stack_trace")
                .map(|trace| truncate_stack_trace(trace, self.config.stack_trace_limit))
                .unwrap_or_default(),
        }
    }
}

/// Ids in first-seen order, duplicates dropped.
fn distinct_ids<I, S>(event_ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    event_ids
        .into_iter()
        .map(|id| id.as_ref().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Split ids into the sequential lookup groups.
pub fn lookup_groups(ids: &[String], group_size: usize) -> Vec<&[String]> {
    ids.chunks(group_size.max(1)).collect()
}

/// Stable sort by `@timestamp`; hits without a usable timestamp go last, in the
/// order the backend returned them.
fn sort_by_timestamp(mut hits: Vec<LogHit>) -> Vec<LogHit> {
    hits.sort_by_cached_key(|hit| {
        let ts = hit.timestamp();
        (ts.is_none(), ts)
    });
    hits
}

/// First `limit` characters followed by `...`.
pub fn truncate_stack_trace(trace: &str, limit: usize) -> String {
    let prefix: String = trace.chars().take(limit).collect();
    format!("{}...", prefix)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend keyed by event id; tracks total and peak in-flight calls.
    #[derive(Default)]
    struct MockSearchBackend {
        hits: HashMap<String, Vec<Value>>,
        failing: HashSet<String>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        queried_ids: Mutex<Vec<String>>,
    }

    impl MockSearchBackend {
        fn with_hits(mut self, event_id: &str, sources: Vec<Value>) -> Self {
            self.hits.insert(event_id.to_string(), sources);
            self
        }

        fn failing_for(mut self, event_id: &str) -> Self {
            self.failing.insert(event_id.to_string());
            self
        }
    }

    fn event_id_of(query: &Value) -> String {
        query["bool"]["must"][0]["match_phrase"]["eventId"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    #[async_trait]
    impl LogSearchBackend for MockSearchBackend {
        async fn search(
            &self,
            _index: &str,
            query: &Value,
            _size: u32,
        ) -> Result<Vec<LogHit>, SearchError> {
            let event_id = event_id_of(query);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queried_ids.lock().unwrap().push(event_id.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&event_id) {
                return Err(SearchError::Api {
                    status: 500,
                    message: "search cluster unavailable".to_string(),
                });
            }

            Ok(self
                .hits
                .get(&event_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|source| serde_json::from_value(json!({ "_source": source })).unwrap())
                .collect())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn client(backend: MockSearchBackend) -> (Arc<MockSearchBackend>, LogCorrelationClient) {
        let backend = Arc::new(backend);
        let client = LogCorrelationClient::new(backend.clone(), CorrelationConfig::default());
        (backend, client)
    }

    fn log(ts: &str, message: &str) -> Value {
        json!({
            "@timestamp": ts,
            "message": message,
            "serviceName": "order-service",
            "level": "ERROR",
            "stack_trace": format!("at {}", message)
        })
    }

    #[tokio::test]
    async fn test_brackets_are_corrected_for_out_of_order_hits() {
        let (_, client) = client(MockSearchBackend::default().with_hits(
            "e-1",
            vec![
                log("2024-05-01T10:00:02Z", "T2"),
                log("2024-05-01T10:00:01Z", "T1"),
                log("2024-05-01T10:00:03Z", "T3"),
            ],
        ));

        let result = client.bracket_for("e-1").await.unwrap();

        assert_eq!(result.first_error_log_details.message.as_deref(), Some("T1"));
        assert_eq!(result.last_error_log_details.message.as_deref(), Some("T3"));
        assert_eq!(
            result.first_error_log_details.service_name.as_deref(),
            Some("order-service")
        );
        assert_eq!(result.first_error_log_details.stack_trace, "at T1...");
    }

    #[tokio::test]
    async fn test_single_hit_is_both_first_and_last() {
        let (_, client) = client(
            MockSearchBackend::default().with_hits("e-1", vec![log("2024-05-01T10:00:00Z", "only")]),
        );

        let result = client.bracket_for("e-1").await.unwrap();

        assert_eq!(result.first_error_log_details, result.last_error_log_details);
    }

    #[tokio::test]
    async fn test_resolve_returns_a_key_per_id_including_misses() {
        let (backend, client) = client(
            MockSearchBackend::default()
                .with_hits("e-1", vec![log("2024-05-01T10:00:00Z", "boom")])
                .failing_for("e-3"),
        );

        let brackets = client
            .resolve_error_brackets(["e-1", "e-2", "e-3"])
            .await;

        assert_eq!(brackets.len(), 3);
        assert!(brackets["e-1"].is_some());
        assert!(brackets["e-2"].is_none(), "no logs maps to None");
        assert!(brackets["e-3"].is_none(), "failed lookup maps to None");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resolve_bounds_concurrency_to_group_size() {
        let (backend, client) = client(MockSearchBackend::default());
        let ids: Vec<String> = (0..12).map(|i| format!("e-{}", i)).collect();

        let brackets = client.resolve_error_brackets(&ids).await;

        assert_eq!(brackets.len(), 12);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 12);
        assert_eq!(backend.peak_in_flight.load(Ordering::SeqCst), 5);
        assert_eq!(lookup_groups(&ids, DEFAULT_GROUP_SIZE).len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_looks_up_duplicate_ids_once() {
        let (backend, client) = client(MockSearchBackend::default());

        let brackets = client
            .resolve_error_brackets(["e-1", "e-2", "e-1", "e-2"])
            .await;

        assert_eq!(brackets.len(), 2);
        assert_eq!(*backend.queried_ids.lock().unwrap(), vec!["e-1", "e-2"]);
    }

    #[tokio::test]
    async fn test_resolve_keeps_empty_id_without_querying() {
        let (backend, client) = client(
            MockSearchBackend::default().with_hits("e-1", vec![log("2024-05-01T10:00:00Z", "boom")]),
        );

        let brackets = client.resolve_error_brackets(["e-1", "", "e-2", ""]).await;

        assert_eq!(brackets.len(), 3);
        assert!(brackets["e-1"].is_some());
        assert!(brackets[""].is_none());
        assert!(brackets["e-2"].is_none());
        assert_eq!(*backend.queried_ids.lock().unwrap(), vec!["e-1", "e-2"]);
    }

    #[test]
    fn test_lookup_groups_cover_all_ids() {
        let ids: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let groups = lookup_groups(&ids, 5);

        assert_eq!(
            groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![5, 5, 1]
        );
        assert!(lookup_groups(&[], 5).is_empty());
    }

    #[test]
    fn test_hits_without_timestamp_sort_last() {
        let hits: Vec<LogHit> = vec![
            json!({ "_id": "no-ts", "_source": {} }),
            json!({ "_id": "late", "_source": { "@timestamp": "2024-05-01T10:00:05Z" } }),
            json!({ "_id": "early", "_source": { "@timestamp": "2024-05-01T10:00:01Z" } }),
        ]
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();

        let ids: Vec<String> = sort_by_timestamp(hits).into_iter().map(|h| h.id).collect();

        assert_eq!(ids, vec!["early", "late", "no-ts"]);
    }

    #[test]
    fn test_truncate_stack_trace_bounds_length() {
        let trace = "x".repeat(2500);
        let truncated = truncate_stack_trace(&trace, 1000);

        assert_eq!(truncated.len(), 1003);
        assert!(truncated.ends_with("..."));
    }
}
