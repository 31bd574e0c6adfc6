use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CalendarDate, EmployeeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    AlreadyCompleted,
    Persistence,
}

/// A rejected mutation. The store is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("{0}")]
    Validation(String),
    #[error("employee {0} not found")]
    EmployeeNotFound(EmployeeId),
    #[error("team '{0}' not found")]
    TeamNotFound(String),
    #[error("break for employee {employee_id} on {date} is already completed")]
    AlreadyCompleted {
        employee_id: EmployeeId,
        date: CalendarDate,
    },
}

impl BoardError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::EmployeeNotFound(_) | Self::TeamNotFound(_) => ErrorCode::NotFound,
            Self::AlreadyCompleted { .. } => ErrorCode::AlreadyCompleted,
        }
    }
}

/// Local or remote save failed. The in-memory change still stands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("changes were kept in memory but not saved: {message}")]
pub struct PersistenceWarning {
    pub message: String,
}

impl PersistenceWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&BoardError> for ErrorReport {
    fn from(value: &BoardError) -> Self {
        Self::new(value.code(), value.to_string())
    }
}

impl From<&PersistenceWarning> for ErrorReport {
    fn from(value: &PersistenceWarning) -> Self {
        Self::new(ErrorCode::Persistence, value.to_string())
    }
}
