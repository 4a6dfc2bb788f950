//! Error handling for StudyGroupFinder
//!
//! This module defines the error taxonomy surfaced by every mutating
//! operation, plus the infrastructure errors the store backends produce.

use thiserror::Error;

/// Main error type for StudyGroupFinder
#[derive(Error, Debug)]
pub enum StudyGroupError {
    #[error("User not authenticated")]
    Unauthenticated,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Event is full: {event_id}")]
    EventFull { event_id: String },

    #[error("User {user_id} already joined event {event_id}")]
    AlreadyJoined { event_id: String, user_id: String },

    #[error("User {user_id} is not a participant of event {event_id}")]
    NotAParticipant { event_id: String, user_id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Subscription limit reached for user {user_id} (max {limit})")]
    SubscriptionLimit { user_id: String, limit: usize },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for StudyGroupFinder operations
pub type Result<T> = std::result::Result<T, StudyGroupError>;

impl StudyGroupError {
    pub fn event_not_found(event_id: impl Into<String>) -> Self {
        StudyGroupError::NotFound { entity: "Event", id: event_id.into() }
    }

    pub fn chat_not_found(chat_id: impl Into<String>) -> Self {
        StudyGroupError::NotFound { entity: "Chat", id: chat_id.into() }
    }

    /// Check if the caller may retry the whole operation
    pub fn is_recoverable(&self) -> bool {
        match self {
            StudyGroupError::TransientStore(_) => true,
            StudyGroupError::Database(e) => is_transient_sqlx(e),
            StudyGroupError::Io(_) => true,
            StudyGroupError::SubscriptionLimit { .. } => true,
            StudyGroupError::Unauthenticated
            | StudyGroupError::NotFound { .. }
            | StudyGroupError::PermissionDenied(_)
            | StudyGroupError::EventFull { .. }
            | StudyGroupError::AlreadyJoined { .. }
            | StudyGroupError::NotAParticipant { .. }
            | StudyGroupError::InvalidArgument(_)
            | StudyGroupError::Migration(_)
            | StudyGroupError::Config(_)
            | StudyGroupError::Token(_)
            | StudyGroupError::Serialization(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StudyGroupError::Database(_) => ErrorSeverity::Critical,
            StudyGroupError::Migration(_) => ErrorSeverity::Critical,
            StudyGroupError::Config(_) => ErrorSeverity::Critical,
            StudyGroupError::PermissionDenied(_) => ErrorSeverity::Warning,
            StudyGroupError::Unauthenticated => ErrorSeverity::Warning,
            StudyGroupError::Token(_) => ErrorSeverity::Warning,
            StudyGroupError::SubscriptionLimit { .. } => ErrorSeverity::Warning,
            StudyGroupError::EventFull { .. }
            | StudyGroupError::AlreadyJoined { .. }
            | StudyGroupError::NotAParticipant { .. }
            | StudyGroupError::InvalidArgument(_)
            | StudyGroupError::NotFound { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

fn is_transient_sqlx(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
