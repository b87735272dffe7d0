//! Log search backend: OpenSearch over HTTP
//!
//! Queries are plain OpenSearch DSL (`serde_json::Value`). `LogFilter` builds the
//! exact-phrase filters the correlation client needs: fields are AND'd under
//! `bool.must`, several values for one field are OR'd in a nested `bool.should`.
//! Every search is sorted by `@timestamp` ascending.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::DlqOpsConfig;

pub const TIMESTAMP_FIELD: &str = "@timestamp";

// ============================================================================
// LogSearchBackend trait
// ============================================================================

#[async_trait]
pub trait LogSearchBackend: Send + Sync {
    /// Run `query` against `index`, returning at most `size` hits sorted by
    /// `@timestamp` ascending.
    async fn search(
        &self,
        index: &str,
        query: &Value,
        size: u32,
    ) -> Result<Vec<LogHit>, SearchError>;

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// One raw search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogHit {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

impl LogHit {
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.source.get(key).and_then(Value::as_str)
    }

    /// `@timestamp` as RFC 3339 text or epoch milliseconds.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.source.get(TIMESTAMP_FIELD)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            _ => None,
        }
    }
}

// ============================================================================
// Query building
// ============================================================================

/// Exact-phrase filter over log fields.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    fields: Vec<(String, Vec<String>)>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.any_of(key, [value.into()])
    }

    /// Match any of `values` for `key`.
    pub fn any_of<I>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let values: Vec<String> = values.into_iter().collect();
        if !values.is_empty() {
            self.fields.push((key.into(), values));
        }
        self
    }

    pub fn to_query(&self) -> Value {
        let must: Vec<Value> = self
            .fields
            .iter()
            .map(|(key, values)| match values.as_slice() {
                [single] => match_phrase(key, single),
                many => json!({
                    "bool": {
                        "should": many.iter().map(|v| match_phrase(key, v)).collect::<Vec<_>>(),
                        "minimum_should_match": 1
                    }
                }),
            })
            .collect();

        json!({ "bool": { "must": must } })
    }
}

fn match_phrase(key: &str, value: &str) -> Value {
    json!({ "match_phrase": { key: value } })
}

/// `term` filter on an exact keyword value.
pub fn term_query(field: &str, value: &str) -> Value {
    json!({ "bool": { "must": [ { "term": { field: value } } ] } })
}

pub fn match_all() -> Value {
    json!({ "match_all": {} })
}

// ============================================================================
// OpenSearchClient
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<LogHit>,
}

#[derive(Debug, Clone)]
pub struct OpenSearchClient {
    client: Client,
    base_url: String,
}

impl OpenSearchClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client for the active environment's OpenSearch host.
    pub fn from_config(config: &DlqOpsConfig) -> anyhow::Result<Self> {
        let env = config.active_environment()?;
        Ok(Self::new(
            env.opensearch_host.clone(),
            Duration::from_secs(config.search.request_timeout_seconds),
        )?)
    }
}

#[async_trait]
impl LogSearchBackend for OpenSearchClient {
    async fn search(
        &self,
        index: &str,
        query: &Value,
        size: u32,
    ) -> Result<Vec<LogHit>, SearchError> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let body = json!({
            "query": query,
            "sort": [ { TIMESTAMP_FIELD: "asc" } ],
            "size": size,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(index, status = status.as_u16(), message = %message, "Search query failed");
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = response.json().await?;
        tracing::debug!(index, hits = parsed.hits.hits.len(), "Search query returned");
        Ok(parsed.hits.hits)
    }

    fn name(&self) -> &str {
        "opensearch"
    }
}

// ============================================================================
// TESTS
// ============================================================================
