//! Search progress events.
//!
//! The engine reports coarse session status to a [`ProgressReporter`].
//! Every event is addressed to a group named after the session's client
//! channel (see [`channel_group`]). Delivery is fire-and-forget: reporters
//! never fail the session.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::models::SearchSession;

/// Status carried by a [`SearchProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Started,
    InProgress,
    Complete,
    Error,
}

/// Wire shape of a progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProgressEvent {
    /// Always `"search_status"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub status: SearchStatus,
    /// Session id.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_progress: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchProgressEvent {
    fn new(status: SearchStatus, id: &str) -> Self {
        Self {
            kind: "search_status".to_string(),
            status,
            id: id.to_string(),
            found_files: None,
            current_progress: None,
            error: None,
        }
    }

    pub fn started(id: &str) -> Self {
        Self::new(SearchStatus::Started, id)
    }

    pub fn in_progress(id: &str, found_files: usize, current_progress: usize) -> Self {
        Self {
            found_files: Some(found_files),
            current_progress: Some(current_progress),
            ..Self::new(SearchStatus::InProgress, id)
        }
    }

    pub fn complete(id: &str) -> Self {
        Self::new(SearchStatus::Complete, id)
    }

    pub fn error(id: &str, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(SearchStatus::Error, id)
        }
    }
}

/// Group a session's events are addressed to: `search_<channel or id>`.
pub fn channel_group(session: &SearchSession) -> String {
    format!("search_{}", session.channel.as_deref().unwrap_or(&session.id))
}

/// Receives progress events. Implementations must not block for long.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, group: &str, event: &SearchProgressEvent);
}

/// No-op reporter.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _group: &str, _event: &SearchProgressEvent) {}
}

/// Keeps every event in memory, in order.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(String, SearchProgressEvent)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, SearchProgressEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn statuses(&self) -> Vec<SearchStatus> {
        self.events().into_iter().map(|(_, e)| e.status).collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, group: &str, event: &SearchProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((group.to_string(), event.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape() {
        let json = serde_json::to_value(SearchProgressEvent::in_progress("s1", 3, 1)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "search_status",
                "status": "in_progress",
                "id": "s1",
                "found_files": 3,
                "current_progress": 1
            })
        );
        let json = serde_json::to_value(SearchProgressEvent::error("s1", "boom")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json.get("found_files").is_none());
    }

    #[test]
    fn group_prefers_channel() {
        let session = SearchSession::new("x");
        assert_eq!(channel_group(&session), format!("search_{}", session.id));
        let session = session.with_channel("client-7");
        assert_eq!(channel_group(&session), "search_client-7");
    }

    #[test]
    fn recording_keeps_order() {
        let rec = RecordingProgress::new();
        rec.report("g", &SearchProgressEvent::started("s"));
        rec.report("g", &SearchProgressEvent::complete("s"));
        assert_eq!(rec.statuses(), vec![SearchStatus::Started, SearchStatus::Complete]);
    }
}
