//! Shared service context. Backends are built once at startup and handed to the
//! router, the HTTP API and the subsystems.

use std::sync::Arc;

use dlqops_core::correlation::CorrelationConfig;
use dlqops_core::queue::SqsConfig;
use dlqops_core::{
    ArtifactWriter, DlqOpsConfig, DlqOpsError, DynamoDbOrderStore, LogCorrelationClient,
    LogSearchBackend, OpenSearchClient, OrderStore, QueueBackend, QueueGateway,
    SearchLinkBuilder, SqsQueueClient,
};

pub struct AppContext {
    pub config: DlqOpsConfig,
    pub gateway: QueueGateway,
    pub correlation: LogCorrelationClient,
    pub orders: Arc<dyn OrderStore>,
    pub artifacts: ArtifactWriter,
    pub links: SearchLinkBuilder,
}

impl AppContext {
    pub fn new(
        config: DlqOpsConfig,
        queue: Arc<dyn QueueBackend>,
        search: Arc<dyn LogSearchBackend>,
        orders: Arc<dyn OrderStore>,
    ) -> Result<Self, DlqOpsError> {
        let links = SearchLinkBuilder::from_environment(config.active_environment()?);
        let gateway = QueueGateway::new(queue, config.queue.wait_time_seconds);
        let correlation = LogCorrelationClient::new(search, CorrelationConfig::from(&config));

        Ok(Self {
            config,
            gateway,
            correlation,
            orders,
            artifacts: ArtifactWriter::new(),
            links,
        })
    }

    /// Context backed by SQS, OpenSearch and DynamoDB clients for `config`.
    pub fn from_config(config: DlqOpsConfig) -> anyhow::Result<Self> {
        let queue = SqsQueueClient::new(SqsConfig::from_config(&config))?;
        let search = OpenSearchClient::from_config(&config)?;
        let orders = DynamoDbOrderStore::from_config(&config)?;

        tracing::info!(
            environment = %config.service.environment,
            region = %config.aws.region,
            endpoint = config.aws.endpoint_url.as_deref().unwrap_or("aws"),
            "Backends configured"
        );

        Ok(Self::new(
            config,
            Arc::new(queue),
            Arc::new(search),
            Arc::new(orders),
        )?)
    }

    /// Environment tag used in artifact names.
    pub fn environment(&self) -> &str {
        &self.config.service.environment
    }
}
