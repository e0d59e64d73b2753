#![forbid(unsafe_code)]

use tt_core::ids::Level;
use tt_core::status::TaskStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTaskRequest {
    pub level: Level,
    pub parent_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRequest {
    pub to: TaskStatus,
    pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
}

impl TaskSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created_at" => Some(TaskSort::CreatedAt),
            "updated_at" => Some(TaskSort::UpdatedAt),
            "title" => Some(TaskSort::Title),
            _ => None,
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            TaskSort::CreatedAt => "created_at_ms",
            TaskSort::UpdatedAt => "updated_at_ms",
            TaskSort::Title => "title",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchTasksRequest {
    pub level: Option<Level>,
    pub status: Option<TaskStatus>,
    pub parent_id: Option<i64>,
    pub q: Option<String>,
    pub sort: TaskSort,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchTasksRequest {
    fn default() -> Self {
        Self {
            level: None,
            status: None,
            parent_id: None,
            q: None,
            sort: TaskSort::default(),
            order: SortOrder::default(),
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentKind {
    Review,
    Note,
}

impl CommentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentKind::Review => "review",
            CommentKind::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "review" => Some(CommentKind::Review),
            "note" => Some(CommentKind::Note),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentRequest {
    pub kind: CommentKind,
    pub body: String,
    pub created_by: Option<String>,
}
