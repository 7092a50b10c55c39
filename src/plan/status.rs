use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Canonical step state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    InProgress,
    Done,
    Blocked,
}

impl PlanStatus {
    /// Normalize free-text status. Unknown text is `Planned`, never `Blocked`.
    pub fn classify(raw: &str) -> Self {
        let normalized = normalize(raw);
        match normalized.as_str() {
            "done" | "complete" | "completed" | "finished" | "ok" | "closed" => PlanStatus::Done,
            "in_progress" | "inprogress" | "active" | "working" | "running" | "current"
            | "doing" | "wip" => PlanStatus::InProgress,
            "blocked" | "error" | "fail" | "failed" | "stuck" => PlanStatus::Blocked,
            _ => PlanStatus::Planned,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Planned => "planned",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Done => "done",
            PlanStatus::Blocked => "blocked",
        }
    }
}

/// Status text marking the step that should start next.
pub const NEXT_MARKER: &str = "next";

/// True for `next` and its spellings (`up_next`, `queued`).
pub fn is_next_marker(raw: &str) -> bool {
    matches!(normalize(raw).as_str(), "next" | "up_next" | "queued")
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|ch| if ch == '-' || ch == ' ' { '_' } else { ch })
        .collect()
}

/// Per-status leaf counts for a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub planned: usize,
    pub in_progress: usize,
    pub done: usize,
    pub blocked: usize,
}

impl StatusCounts {
    pub fn leaf(status: PlanStatus) -> Self {
        let mut counts = Self::default();
        counts.add(status);
        counts
    }

    pub fn add(&mut self, status: PlanStatus) {
        match status {
            PlanStatus::Planned => self.planned += 1,
            PlanStatus::InProgress => self.in_progress += 1,
            PlanStatus::Done => self.done += 1,
            PlanStatus::Blocked => self.blocked += 1,
        }
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.planned += other.planned;
        self.in_progress += other.in_progress;
        self.done += other.done;
        self.blocked += other.blocked;
    }

    pub fn total(&self) -> usize {
        self.planned + self.in_progress + self.done + self.blocked
    }

    /// Status implied by the counts for a container without its own status.
    pub fn derived_status(&self) -> PlanStatus {
        let total = self.total();
        if total > 0 && self.done == total {
            PlanStatus::Done
        } else if self.in_progress > 0 {
            PlanStatus::InProgress
        } else if self.blocked > 0 {
            PlanStatus::Blocked
        } else if self.done > 0 {
            PlanStatus::InProgress
        } else {
            PlanStatus::Planned
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "planned": self.planned,
            "in_progress": self.in_progress,
            "done": self.done,
            "blocked": self.blocked,
            "total": self.total(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(PlanStatus::classify("DONE"), PlanStatus::Done);
        assert_eq!(PlanStatus::classify(" In-Progress "), PlanStatus::InProgress);
        assert_eq!(PlanStatus::classify("Failed"), PlanStatus::Blocked);
        assert_eq!(PlanStatus::classify("todo"), PlanStatus::Planned);
    }

    #[test]
    fn unknown_status_is_planned_not_blocked() {
        assert_eq!(PlanStatus::classify("??"), PlanStatus::Planned);
        assert_eq!(PlanStatus::classify(""), PlanStatus::Planned);
        assert_eq!(PlanStatus::classify("next"), PlanStatus::Planned);
    }

    #[test]
    fn next_marker_spellings() {
        assert!(is_next_marker("Next"));
        assert!(is_next_marker("up next"));
        assert!(is_next_marker("queued"));
        assert!(!is_next_marker("planned"));
    }

    #[test]
    fn derived_status_prefers_progress_over_block() {
        let mut counts = StatusCounts::default();
        counts.add(PlanStatus::Done);
        assert_eq!(counts.derived_status(), PlanStatus::Done);
        counts.add(PlanStatus::Planned);
        assert_eq!(counts.derived_status(), PlanStatus::InProgress);
        let mut blocked = StatusCounts::leaf(PlanStatus::Blocked);
        blocked.add(PlanStatus::Planned);
        assert_eq!(blocked.derived_status(), PlanStatus::Blocked);
        assert_eq!(StatusCounts::default().derived_status(), PlanStatus::Planned);
    }
}
