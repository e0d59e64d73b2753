#![forbid(unsafe_code)]

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    ReviewPending,
    Revising,
    Blocked,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::ReviewPending => "review_pending",
            TaskStatus::Revising => "revising",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(TaskStatus::NotStarted),
            "in_progress" => Some(TaskStatus::InProgress),
            "review_pending" => Some(TaskStatus::ReviewPending),
            "revising" => Some(TaskStatus::Revising),
            "blocked" => Some(TaskStatus::Blocked),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Completed is terminal; every other status has at least one exit.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (TaskStatus::NotStarted, TaskStatus::InProgress)
                | (TaskStatus::NotStarted, TaskStatus::Blocked)
                | (TaskStatus::InProgress, TaskStatus::ReviewPending)
                | (TaskStatus::InProgress, TaskStatus::Blocked)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::ReviewPending, TaskStatus::Revising)
                | (TaskStatus::ReviewPending, TaskStatus::Completed)
                | (TaskStatus::Revising, TaskStatus::ReviewPending)
                | (TaskStatus::Revising, TaskStatus::InProgress)
                | (TaskStatus::Blocked, TaskStatus::NotStarted)
                | (TaskStatus::Blocked, TaskStatus::InProgress)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}
