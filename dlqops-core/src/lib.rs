pub mod artifact;
pub mod config;
pub mod correlation;
pub mod error;
pub mod gateway;
pub mod ipc;
pub mod models;
pub mod orders;
pub mod permalink;
pub mod queue;
pub mod search;

pub use artifact::{ArtifactError, ArtifactWriter};
pub use config::DlqOpsConfig;
pub use correlation::{CorrelationConfig, LogCorrelationClient};
pub use error::DlqOpsError;
pub use gateway::{DeletionReport, QueueGateway};
pub use ipc::{OpsRequest, OpsResponse};
pub use orders::{get_items_status, DynamoDbOrderStore, OrderStore, OrderStoreError};
pub use permalink::SearchLinkBuilder;
pub use queue::{QueueBackend, QueueError, SqsQueueClient};
pub use search::{LogSearchBackend, OpenSearchClient, SearchError};
