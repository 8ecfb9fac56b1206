use serde::Serialize;
use thiserror::Error;

use crate::core::lifecycle::TransitionError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub title: String,
    pub description: String,
}

impl FieldError {
    pub fn new(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Error, Debug, Serialize)]
pub enum ExpenseError {
    /// Expense with given ID not found
    #[error("Expense {0} not found")]
    ExpenseNotFound(String),

    /// Program with given ID not found
    #[error("Program {0} not found")]
    ProgramNotFound(String),

    /// User with given ID not found
    #[error("User {0} not found")]
    UserNotFound(String),

    /// Category does not belong to the expense's program
    #[error("Category {0} is not defined for this program")]
    UnknownCategory(String),

    /// No file stored at the requested slot position
    #[error("File {0} not found")]
    FileNotFound(String),

    /// Email is already registered
    #[error("Email {0} already registered")]
    EmailAlreadyRegistered(String),

    /// Generic input validation error with detailed field information
    #[error("Invalid input for field `{0}`: {1:?}")]
    InvalidInput(String, FieldError),

    /// Status change rejected by the lifecycle rules
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Rejected and closed expenses cannot be edited
    #[error("Expense {0} can no longer be edited")]
    ExpenseLocked(String),

    /// Slot already holds the configured maximum number of files
    #[error("Slot {0} already holds {1} files")]
    SlotFull(String, usize),

    /// Slot is not available for this kind of expense
    #[error("Attachments of type {0} are not allowed for this expense")]
    AttachmentNotAllowed(String),

    /// Program budget does not allow new expenses
    #[error("Program {0} is over budget")]
    OverBudget(String),

    /// Same request for the same expense is still being processed
    #[error("A request for expense {0} is already in progress")]
    RequestInFlight(String),

    /// Caller lacks the role or assignment required for the action
    #[error("User {0} is not authorized for this action")]
    NotAuthorized(String),

    /// Missing, malformed or expired bearer token
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Logging error: {0}")]
    LoggingError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("File store error: {0}")]
    FileStoreError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    /// Internal server error (e.g., unexpected failure)
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl ExpenseError {
    pub fn invalid(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        ExpenseError::InvalidInput(field.to_string(), FieldError::new(field, title, description))
    }

    /// Failures whose detail stays server-side.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ExpenseError::StorageError(_)
                | ExpenseError::LoggingError(_)
                | ExpenseError::CacheError(_)
                | ExpenseError::FileStoreError(_)
                | ExpenseError::NotificationError(_)
                | ExpenseError::InternalServerError(_)
        )
    }
}
