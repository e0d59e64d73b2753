#![forbid(unsafe_code)]

use tt_core::ids::Level;
use tt_core::status::TaskStatus;
use tt_core::validate::ValidateError;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    UnknownId,
    ParentNotFound,
    UnexpectedParent,
    MissingParent,
    LevelMismatch {
        level: Level,
        parent_level: Level,
    },
    InvalidTransition {
        from: TaskStatus,
        to: TaskStatus,
    },
    AllocationConflict,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UnknownId => write!(f, "unknown id"),
            Self::ParentNotFound => write!(f, "parent task not found"),
            Self::UnexpectedParent => write!(f, "a requirement must not have a parent"),
            Self::MissingParent => write!(f, "a parent is required for this level"),
            Self::LevelMismatch {
                level,
                parent_level,
            } => write!(
                f,
                "level mismatch (level={}, parent_level={})",
                level.as_str(),
                parent_level.as_str()
            ),
            Self::InvalidTransition { from, to } => write!(
                f,
                "invalid status transition (from={}, to={})",
                from.as_str(),
                to.as_str()
            ),
            Self::AllocationConflict => write!(f, "identifier allocation conflict"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<ValidateError> for StoreError {
    fn from(value: ValidateError) -> Self {
        match value {
            ValidateError::UnexpectedParent => Self::UnexpectedParent,
            ValidateError::MissingParent => Self::MissingParent,
            ValidateError::LevelMismatch {
                level,
                parent_level,
            } => Self::LevelMismatch {
                level,
                parent_level,
            },
        }
    }
}
