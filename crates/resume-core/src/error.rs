//! Error types for the resume search engine.

use thiserror::Error;

/// Result type alias using SearchError.
pub type Result<T> = std::result::Result<T, SearchError>;

/// External backends the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Embedding,
    Keyword,
    Rerank,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Embedding => "embedding",
            Self::Keyword => "keyword",
            Self::Rerank => "rerank",
        };
        write!(f, "{}", s)
    }
}

/// Errors that can occur in the resume search engine.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Missing credential or invalid configuration. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Candidate not found.
    #[error("Candidate not found: {id}")]
    CandidateNotFound { id: String },

    /// Dataset or persisted store not found.
    #[error("Dataset not found: {name}")]
    DatasetNotFound { name: String },

    /// Vector index has no embeddings loaded.
    #[error("Vector index '{name}' has no data loaded")]
    NotLoaded { name: String },

    /// Failure talking to an external backend.
    #[error("{service} service error: {message}")]
    ExternalService {
        service: ServiceKind,
        message: String,
        retryable: bool,
    },

    /// Invalid caller input, rejected before any backend call.
    #[error("Invalid request: {message}")]
    Validation { message: String },

    /// Malformed source data.
    #[error("Data error: {message}")]
    Data { message: String },

    /// Embedding shape or content problem.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SearchError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a non-retryable external service error.
    pub fn service(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service,
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a retryable external service error (network, 429, 5xx).
    pub fn transient(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service,
            message: message.into(),
            retryable: true,
        }
    }

    /// Classify a non-success HTTP status. 429 and 5xx are retryable.
    pub fn from_status(service: ServiceKind, status: u16, body: &str) -> Self {
        let retryable = status == 429 || (500..600).contains(&status);
        Self::ExternalService {
            service,
            message: format!("HTTP {}: {}", status, body.trim()),
            retryable,
        }
    }

    /// Whether a retry loop may try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService { retryable: true, .. })
    }

    /// Whether the error was caused by caller input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::CandidateNotFound { .. } | Self::DatasetNotFound { .. }
        )
    }

    /// Get the error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::CandidateNotFound { .. } => "CANDIDATE_NOT_FOUND",
            Self::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            Self::NotLoaded { .. } => "NOT_LOADED",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Data { .. } => "DATA_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SearchError::CandidateNotFound {
            id: "abc123".to_string(),
        };
        assert!(err.to_string().contains("abc123"));

        let err = SearchError::transient(ServiceKind::Keyword, "connection refused");
        assert_eq!(err.to_string(), "keyword service error: connection refused");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SearchError::CandidateNotFound {
                id: "x".to_string()
            }
            .error_code(),
            "CANDIDATE_NOT_FOUND"
        );
        assert_eq!(SearchError::validation("empty").error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SearchError::transient(ServiceKind::Rerank, "429").is_retryable());
        assert!(!SearchError::service(ServiceKind::Rerank, "400").is_retryable());
        assert!(!SearchError::validation("bad").is_retryable());
        assert!(SearchError::validation("bad").is_client_error());
        assert!(SearchError::from_status(ServiceKind::Embedding, 429, "slow down").is_retryable());
        assert!(SearchError::from_status(ServiceKind::Keyword, 503, "").is_retryable());
        assert!(!SearchError::from_status(ServiceKind::Rerank, 401, "bad key").is_retryable());
        assert!(!SearchError::embedding("dim").is_client_error());
    }
}
