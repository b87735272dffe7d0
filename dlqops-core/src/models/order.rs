use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionItemStatus {
    pub position_item_id: String,
    pub status: Option<String>,
}
