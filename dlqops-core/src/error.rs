use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::orders::OrderStoreError;
use crate::queue::QueueError;
use crate::search::SearchError;

#[derive(Error, Debug)]
pub enum DlqOpsError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Order store error: {0}")]
    OrderStore(#[from] OrderStoreError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}
