use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Delivery metadata assigned by the queue backend. Required for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub message_id: String,
    pub receipt_handle: String,
    pub receive_count: u32,
}

/// Domain body of a dead-lettered message.
///
/// Identifier fields are read leniently: a field of an unexpected JSON type is
/// absent on its own and never discards the rest of the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub event_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub trace_id: Option<String>,
    pub event_time: Option<Value>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub event_type: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub metadata: MessageMetadata,
    pub body: EventPayload,
    /// Body exactly as delivered; this is what gets backed up.
    #[serde(skip)]
    pub raw_body: String,
}

impl QueueMessage {
    /// Build a message from a raw delivery. Bodies that are not JSON objects keep an
    /// empty payload so the raw text can still be backed up.
    pub fn from_raw(metadata: MessageMetadata, raw_body: String) -> Self {
        let body = match serde_json::from_str::<EventPayload>(&raw_body) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    message_id = %metadata.message_id,
                    error = %e,
                    "Message body is not a JSON event payload"
                );
                EventPayload::default()
            }
        };

        Self {
            metadata,
            body,
            raw_body,
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        self.body.event_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Name used for this message's backup file: the event id, falling back to the
    /// message id for bodies without one.
    pub fn backup_key(&self) -> String {
        file_stem(self.event_id().unwrap_or(&self.metadata.message_id))
    }
}

/// Strings as-is, numbers and booleans in their JSON text form, anything else absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// `key` with path separators and parent references replaced, safe to use as a
/// file name.
pub fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect::<String>()
        .replace("..", "_")
}
