pub mod enriched;
pub mod log_record;
pub mod message;
pub mod order;

pub use enriched::{EnrichedRecord, SummaryRow};
pub use log_record::{EnrichmentResult, ErrorLogRecord};
pub use message::{EventPayload, MessageMetadata, QueueMessage};
pub use order::PositionItemStatus;
