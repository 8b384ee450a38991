use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Read,
}

/// Invariant I1: within one `convo_id`, `seq` is strictly increasing and
/// dense. Invariant I2: `server_timestamp` is monotone non-decreasing with
/// `seq` per convo. Both are enforced by the ledger at insert time, not by
/// this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub convo_id: Uuid,
    pub from_address: String,
    pub to_address: String,
    pub content: String,
    pub media_type: Option<String>,
    pub seq: u64,
    pub server_timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}
