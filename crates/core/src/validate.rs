#![forbid(unsafe_code)]

use crate::ids::Level;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidateError {
    UnexpectedParent,
    MissingParent,
    LevelMismatch { level: Level, parent_level: Level },
}

impl ValidateError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnexpectedParent => "a requirement must not have a parent",
            Self::MissingParent => "a parent is required for this level",
            Self::LevelMismatch { .. } => "parent must be exactly one level above",
        }
    }
}

/// Decide whether a node of `level` may be created under a parent of
/// `parent_level` (`None` when no parent is supplied). Rules are checked in
/// order; the first failure wins. Depth beyond subtask is unrepresentable:
/// `Level` has no deeper member.
pub fn validate_parent(level: Level, parent_level: Option<Level>) -> Result<(), ValidateError> {
    match (level.parent(), parent_level) {
        (None, Some(_)) => Err(ValidateError::UnexpectedParent),
        (Some(_), None) => Err(ValidateError::MissingParent),
        (Some(required), Some(actual)) if required != actual => Err(ValidateError::LevelMismatch {
            level,
            parent_level: actual,
        }),
        _ => Ok(()),
    }
}
