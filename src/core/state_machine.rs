//! State machine for scheduled publish tasks
//!
//! Tasks only move forward along `pending → processing → {published | failed
//! | cancelled}`. The single backward edge is the requeue `processing →
//! pending` taken after a retryable failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a scheduled task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Published,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Published => "published",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// No further automatic transition happens from a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Published | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check whether `self → to` is a legal edge
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Published)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Processing, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskTransition {
    /// From state
    pub from: TaskStatus,

    /// To state
    pub to: TaskStatus,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Short reason (worker id, error code, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Get elapsed milliseconds between the first and last transition
pub fn elapsed_ms(transitions: &[TaskTransition]) -> i64 {
    match (transitions.first(), transitions.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
        _ => 0,
    }
}

/// Get transition history as human-readable string
pub fn format_history(transitions: &[TaskTransition]) -> String {
    transitions
        .iter()
        .map(|t| {
            let time = t.timestamp.to_rfc3339();
            let note = t
                .note
                .as_ref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default();
            format!("{}: {} → {}{}", time, t.from, t.to, note)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_edges() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Published));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn test_requeue_edge() {
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn test_terminal_states_never_revert() {
        for terminal in [
            TaskStatus::Published,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for to in [
                TaskStatus::Pending,
                TaskStatus::Processing,
                TaskStatus::Published,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_pending_cannot_skip_processing() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Published));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_history_and_elapsed() {
        let start = Utc::now();
        let transitions = vec![
            TaskTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Processing,
                timestamp: start,
                note: Some("worker-1".to_string()),
            },
            TaskTransition {
                from: TaskStatus::Processing,
                to: TaskStatus::Published,
                timestamp: start + chrono::Duration::milliseconds(250),
                note: None,
            },
        ];

        let history = format_history(&transitions);
        assert!(history.contains("pending → processing (worker-1)"));
        assert!(history.contains("processing → published"));
        assert_eq!(elapsed_ms(&transitions), 250);
        assert_eq!(elapsed_ms(&[]), 0);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);
    }
}
