use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DlqOpsConfig {
    pub service: ServiceConfig,
    pub aws: AwsConfig,
    pub environments: HashMap<String, EnvironmentConfig>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub dlqs: Vec<DlqConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
    /// Environment tag (`live` / `nonlive`) used for queue URLs, permalinks and
    /// summary file names.
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsConfig {
    pub region: String,
    /// Endpoint override (LocalStack or a compatible gateway). When unset the public
    /// regional endpoints are used.
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnvironmentConfig {
    pub account_id: String,
    pub opensearch_host: String,
    pub index_id: String,
    pub default_view_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    pub visibility_timeout_seconds: u32,
    pub wait_time_seconds: u32,
    /// Upper bound on receive calls for the bounded drain used by tools and the
    /// archive flow.
    pub max_drain_receives: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_seconds: 30,
            wait_time_seconds: 10,
            max_drain_receives: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub index_pattern: String,
    pub max_hits: u32,
    pub stack_trace_limit: usize,
    pub lookup_group_size: usize,
    pub request_timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_pattern: "cwl*".to_string(),
            max_hits: 50,
            stack_trace_limit: 1000,
            lookup_group_size: 5,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    pub backup_dir: String,
    pub summary_dir: String,
    pub max_messages_to_fetch: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            backup_dir: "backup".to_string(),
            summary_dir: "dlq-summary".to_string(),
            max_messages_to_fetch: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Receive count at which a backed-up message is considered exhausted and may be
    /// deleted by the archive flow.
    pub max_receive_count: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            max_delay_ms: 10_000,
            max_receive_count: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrdersConfig {
    pub table_name: String,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            table_name: "orders".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3002,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    pub name: String,
}

impl DlqOpsConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("DLQOPS").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.active_environment()?;
        Ok(config)
    }

    /// Settings for `service.environment`.
    pub fn active_environment(&self) -> Result<&EnvironmentConfig, ConfigError> {
        self.environments
            .get(&self.service.environment)
            .ok_or_else(|| {
                ConfigError::Message(format!(
                    "no [environments.{}] section configured",
                    self.service.environment
                ))
            })
    }

    /// Queue URL for a queue name, in the environment's account.
    pub fn queue_url(&self, queue_name: &str) -> Result<String, ConfigError> {
        let account_id = &self.active_environment()?.account_id;
        Ok(match &self.aws.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                account_id,
                queue_name
            ),
            None => format!(
                "https://sqs.{}.amazonaws.com/{}/{}",
                self.aws.region, account_id, queue_name
            ),
        })
    }

    pub fn dlq_names(&self) -> Vec<String> {
        self.dlqs.iter().map(|d| d.name.clone()).collect()
    }
}
