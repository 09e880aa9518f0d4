// ── User-visible notices ──
//
// Every outcome the operator should see (confirmation results, rejected
// sends, parse failures, connectivity banners) is published as a `Notice`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::StationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Pending,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    /// Action tag this notice reports on, if any.
    pub action: Option<String>,
    pub station: Option<StationId>,
    pub message: String,
    /// Companion payload, e.g. a tunnel endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            action: None,
            station: None,
            message: message.into(),
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Pending, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn with_station(mut self, station: StationId) -> Self {
        self.station = Some(station);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// `true` for the levels that end a command's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self.level, NoticeLevel::Success | NoticeLevel::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_lowercase_level_and_skips_empty_detail() {
        let notice = Notice::success("Slot 1/3 locked")
            .with_station(StationId::from("A"))
            .with_action("lock slot");
        let value = serde_json::to_value(&notice).unwrap_or_default();

        assert_eq!(value["level"], json!("success"));
        assert_eq!(value["station"], json!("A"));
        assert!(value.get("detail").is_none());
        assert!(notice.is_terminal());
        assert!(!Notice::pending("sent").is_terminal());
        assert_eq!(NoticeLevel::Info.to_string(), "info");
    }
}
