use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    pub id: i64,
    pub session_id: String,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}
