use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub label: String,
}

impl ViolationEvent {
    pub fn new(session_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            label: label.into(),
        }
    }
}
