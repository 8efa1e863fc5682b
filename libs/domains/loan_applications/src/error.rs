use crate::models::ApplicationStatus;
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Loan application not found: {0}")]
    NotFound(Uuid),

    /// A storage-level unique index rejected the write
    #[error("Duplicate loan application: {0}")]
    Duplicate(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No active tenant with slug '{0}'")]
    TenantNotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;

impl From<DbErr> for ApplicationError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => ApplicationError::Duplicate(detail),
            _ => ApplicationError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApplicationError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApplicationError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_db_error_is_database() {
        let err: ApplicationError = DbErr::Custom("connection reset".to_string()).into();
        assert!(matches!(err, ApplicationError::Database(msg) if msg.contains("connection reset")));
    }

    #[test]
    fn test_transition_message() {
        let err = ApplicationError::InvalidTransition {
            from: ApplicationStatus::Disbursed,
            to: ApplicationStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition from DISBURSED to PENDING"
        );
    }
}
