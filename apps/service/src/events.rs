use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Boot,
    Up,
    Down,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Boot => write!(f, "boot"),
            EventKind::Up => write!(f, "up"),
            EventKind::Down => write!(f, "down"),
        }
    }
}

/// Something worth telling a human about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub kind: EventKind,
    pub server: Option<String>,
    pub message: String,
    pub details: Option<String>,
    pub since: DateTime<Utc>,
}

impl TransitionEvent {
    /// Emitted once when the watcher process starts.
    pub fn boot(hostname: &str, since: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Boot,
            server: None,
            message: format!("Watcher started@{hostname}"),
            details: Some("stwatch has started".into()),
            since,
        }
    }

    pub fn up(server: &str, since: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Up,
            server: Some(server.to_string()),
            message: format!("SurveyTool {server} UP"),
            details: None,
            since,
        }
    }

    pub fn down(server: &str, details: Option<String>, since: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Down,
            server: Some(server.to_string()),
            message: format!("SurveyTool {server} DOWN"),
            details,
            since,
        }
    }
}
