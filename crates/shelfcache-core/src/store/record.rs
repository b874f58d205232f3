use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{RequestKey, ResourceResponse};

/// A stored request/response pair. Never mutated in place; a new put replaces
/// the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub request: RequestKey,
    pub response: ResourceResponse,
    pub stored_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(request: RequestKey, response: ResourceResponse) -> Self {
        Self {
            request,
            response,
            stored_at: Utc::now(),
        }
    }

    pub fn info(&self) -> RecordInfo {
        RecordInfo {
            request: self.request.clone(),
            status: self.response.status,
            size: self.response.body.len() as u64,
            stored_at: self.stored_at,
        }
    }
}

/// Record summary without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub request: RequestKey,
    pub status: u16,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

impl RecordInfo {
    pub fn age_minutes(&self) -> i64 {
        age_minutes(self.stored_at)
    }

    pub fn age_display(&self) -> String {
        age_display(self.stored_at)
    }
}

pub fn age_minutes(stored_at: DateTime<Utc>) -> i64 {
    (Utc::now() - stored_at).num_minutes()
}

/// Human readable age such as "just now", "5m ago", "2h ago" or "3d ago".
pub fn age_display(stored_at: DateTime<Utc>) -> String {
    let minutes = age_minutes(stored_at);
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
