use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy shared by every core operation.
///
/// The first six variants are the business-facing kinds callers branch on;
/// the remaining ones wrap infrastructure failures and all report as
/// [`ErrorKind::Internal`].
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        existing_id: Option<Uuid>,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{operation} failed at the payment processor: {reason}")]
    ExternalFailure {
        operation: String,
        reason: String,
        outcome_unknown: bool,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    BadRequest,
    ExternalFailure,
    Internal,
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            existing_id: None,
        }
    }

    pub fn conflict_with(message: impl Into<String>, existing_id: Uuid) -> Self {
        Self::Conflict {
            message: message.into(),
            existing_id: Some(existing_id),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::Unauthenticated => ErrorKind::Unauthenticated,
            MarketError::Forbidden(_) => ErrorKind::Forbidden,
            MarketError::NotFound { .. } => ErrorKind::NotFound,
            MarketError::Conflict { .. } => ErrorKind::Conflict,
            MarketError::BadRequest(_) => ErrorKind::BadRequest,
            MarketError::ExternalFailure { .. } => ErrorKind::ExternalFailure,
            MarketError::Storage(_)
            | MarketError::Io(_)
            | MarketError::Json(_)
            | MarketError::Csv(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::ExternalFailure => "EXTERNAL_FAILURE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether repeating the same request may succeed without changes.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            MarketError::ExternalFailure { .. } | MarketError::Storage(_)
        )
    }

    pub fn existing_id(&self) -> Option<Uuid> {
        match self {
            MarketError::Conflict { existing_id, .. } => *existing_id,
            _ => None,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for MarketError {
    fn from(err: rocksdb::Error) -> Self {
        MarketError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MarketError::Unauthenticated.code(), "UNAUTHENTICATED");
        assert_eq!(
            MarketError::not_found("payment", "42").code(),
            "NOT_FOUND"
        );
        assert_eq!(MarketError::conflict("taken").code(), "CONFLICT");
        assert_eq!(
            MarketError::Storage("disk".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_conflict_carries_existing_id() {
        let id = Uuid::new_v4();
        let err = MarketError::conflict_with("live proposal exists", id);
        assert_eq!(err.existing_id(), Some(id));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_external_failures_are_retriable() {
        let err = MarketError::ExternalFailure {
            operation: "capture".to_string(),
            reason: "timed out".to_string(),
            outcome_unknown: true,
        };
        assert!(err.is_retriable());
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);
        assert_eq!(
            err.to_string(),
            "capture failed at the payment processor: timed out"
        );
    }
}
