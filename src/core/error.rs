//! Typed error handling for crud-rs
//!
//! Errors are grouped by category so callers can match on what went wrong
//! instead of inspecting messages.
//!
//! # Error Categories
//!
//! - [`EntityError`]: a keyed lookup found nothing
//! - [`QueryError`]: a filter, sort, projection or include expression was rejected
//! - [`ConfigError`]: configuration could not be loaded or is incomplete
//! - [`StorageError`]: the relational store reported a failure
//! - [`RequestError`]: HTTP level failures (authentication, authorization, body)
//!
//! # Example
//!
//! ```rust,ignore
//! use crud::prelude::*;
//!
//! match service.update(song, 42).await {
//!     Ok(song) => println!("Updated: {:?}", song),
//!     Err(CrudError::Entity(EntityError::NotFound { key, .. })) => {
//!         println!("Song {} not found", key);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type for crud-rs
#[derive(Debug)]
pub enum CrudError {
    /// Entity-related errors (keyed lookups)
    Entity(EntityError),

    /// Malformed or disallowed query expressions
    Query(QueryError),

    /// Configuration errors
    Config(ConfigError),

    /// Persistence failures
    Storage(StorageError),

    /// HTTP/Request errors
    Request(RequestError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for CrudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrudError::Entity(e) => write!(f, "{}", e),
            CrudError::Query(e) => write!(f, "{}", e),
            CrudError::Config(e) => write!(f, "{}", e),
            CrudError::Storage(e) => write!(f, "{}", e),
            CrudError::Request(e) => write!(f, "{}", e),
            CrudError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CrudError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrudError::Entity(e) => Some(e),
            CrudError::Query(e) => Some(e),
            CrudError::Config(e) => Some(e),
            CrudError::Storage(e) => Some(e),
            CrudError::Request(e) => Some(e),
            CrudError::Internal(_) => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CrudError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CrudError::Entity(e) => e.status_code(),
            CrudError::Query(_) => StatusCode::BAD_REQUEST,
            CrudError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CrudError::Storage(e) => e.status_code(),
            CrudError::Request(e) => e.status_code(),
            CrudError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CrudError::Entity(e) => e.error_code(),
            CrudError::Query(e) => e.error_code(),
            CrudError::Config(_) => "CONFIG_ERROR",
            CrudError::Storage(e) => e.error_code(),
            CrudError::Request(e) => e.error_code(),
            CrudError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            CrudError::Entity(EntityError::NotFound { entity_type, key }) => {
                Some(serde_json::json!({
                    "entity_type": entity_type,
                    "key": key
                }))
            }
            CrudError::Query(QueryError::Parse { position, .. }) => {
                Some(serde_json::json!({ "position": position }))
            }
            CrudError::Query(QueryError::UnknownField { field, .. }) => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        }
    }

    /// Shorthand for a missing entity
    pub fn not_found(entity_type: &str, key: i64) -> Self {
        CrudError::Entity(EntityError::NotFound {
            entity_type: entity_type.to_string(),
            key,
        })
    }
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Errors related to entity operations
#[derive(Debug)]
pub enum EntityError {
    /// No row exists for the key
    NotFound { entity_type: String, key: i64 },

    /// Failed to serialize/deserialize entity
    SerializationError {
        entity_type: String,
        message: String,
    },
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::NotFound { entity_type, key } => {
                write!(f, "{} with key equal to [{}] not found", entity_type, key)
            }
            EntityError::SerializationError {
                entity_type,
                message,
            } => {
                write!(
                    f,
                    "Failed to serialize/deserialize {}: {}",
                    entity_type, message
                )
            }
        }
    }
}

impl std::error::Error for EntityError {}

impl EntityError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EntityError::NotFound { .. } => StatusCode::NOT_FOUND,
            EntityError::SerializationError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            EntityError::NotFound { .. } => "ENTITY_NOT_FOUND",
            EntityError::SerializationError { .. } => "ENTITY_SERIALIZATION_ERROR",
        }
    }
}

impl From<EntityError> for CrudError {
    fn from(err: EntityError) -> Self {
        CrudError::Entity(err)
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors raised while parsing or validating query expressions
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The expression text could not be parsed
    Parse {
        expression: String,
        position: usize,
        message: String,
    },

    /// The expression names a field that is not on the entity's allow-list
    UnknownField { entity_type: String, field: String },

    /// The expression names a navigation the entity does not declare
    UnknownNavigation {
        entity_type: String,
        navigation: String,
    },

    /// A value cannot be compared with the field's type
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// A positional parameter (`@N`) was referenced but not supplied
    MissingParameter { index: usize },

    /// The operator is not supported for the field's type
    UnsupportedOperator { field: String, operator: String },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Parse {
                expression,
                position,
                message,
            } => {
                write!(
                    f,
                    "Failed to parse '{}' at position {}: {}",
                    expression, position, message
                )
            }
            QueryError::UnknownField { entity_type, field } => {
                write!(f, "No property '{}' exists on {}", field, entity_type)
            }
            QueryError::UnknownNavigation {
                entity_type,
                navigation,
            } => {
                write!(
                    f,
                    "No navigation '{}' exists on {}",
                    navigation, entity_type
                )
            }
            QueryError::TypeMismatch {
                field,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Field '{}' expects {} but got {}",
                    field, expected, found
                )
            }
            QueryError::MissingParameter { index } => {
                write!(f, "No value supplied for parameter @{}", index)
            }
            QueryError::UnsupportedOperator { field, operator } => {
                write!(
                    f,
                    "Operator '{}' is not supported for field '{}'",
                    operator, field
                )
            }
        }
    }
}

impl std::error::Error for QueryError {}

impl QueryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::Parse { .. } => "QUERY_PARSE_ERROR",
            QueryError::UnknownField { .. } => "QUERY_UNKNOWN_FIELD",
            QueryError::UnknownNavigation { .. } => "QUERY_UNKNOWN_NAVIGATION",
            QueryError::TypeMismatch { .. } => "QUERY_TYPE_MISMATCH",
            QueryError::MissingParameter { .. } => "QUERY_MISSING_PARAMETER",
            QueryError::UnsupportedOperator { .. } => "QUERY_UNSUPPORTED_OPERATOR",
        }
    }
}

impl From<QueryError> for CrudError {
    fn from(err: QueryError) -> Self {
        CrudError::Query(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Missing required field in configuration
    MissingField { field: String, context: String },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::MissingField { field, context } => {
                write!(f, "Missing required field '{}' in {}", field, context)
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for CrudError {
    fn from(err: ConfigError) -> Self {
        CrudError::Config(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors reported by the relational store
#[derive(Debug)]
pub enum StorageError {
    /// A unique index or primary key rejected the write
    UniqueViolation { message: String },

    /// A foreign key constraint rejected the write
    ForeignKeyViolation { message: String },

    /// A NOT NULL column received no value
    NotNullViolation { message: String },

    /// A CHECK constraint rejected the write
    CheckViolation { message: String },

    /// Connection or pool error
    ConnectionError { message: String },

    /// Any other query execution error
    QueryError { message: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::UniqueViolation { message } => {
                write!(f, "Unique constraint violated: {}", message)
            }
            StorageError::ForeignKeyViolation { message } => {
                write!(f, "Foreign key constraint violated: {}", message)
            }
            StorageError::NotNullViolation { message } => {
                write!(f, "Not-null constraint violated: {}", message)
            }
            StorageError::CheckViolation { message } => {
                write!(f, "Check constraint violated: {}", message)
            }
            StorageError::ConnectionError { message } => {
                write!(f, "Failed to connect to database: {}", message)
            }
            StorageError::QueryError { message } => {
                write!(f, "Database query error: {}", message)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StorageError::UniqueViolation { .. } => StatusCode::CONFLICT,
            StorageError::ForeignKeyViolation { .. }
            | StorageError::NotNullViolation { .. }
            | StorageError::CheckViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            StorageError::ConnectionError { .. } => StatusCode::SERVICE_UNAVAILABLE,
            StorageError::QueryError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::UniqueViolation { .. } => "UNIQUE_VIOLATION",
            StorageError::ForeignKeyViolation { .. } => "FOREIGN_KEY_VIOLATION",
            StorageError::NotNullViolation { .. } => "NOT_NULL_VIOLATION",
            StorageError::CheckViolation { .. } => "CHECK_VIOLATION",
            StorageError::ConnectionError { .. } => "STORAGE_UNAVAILABLE",
            StorageError::QueryError { .. } => "STORAGE_ERROR",
        }
    }
}

impl From<StorageError> for CrudError {
    fn from(err: StorageError) -> Self {
        CrudError::Storage(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests
#[derive(Debug)]
pub enum RequestError {
    /// Invalid request body
    InvalidBody { message: String },

    /// Unauthorized request
    Unauthorized { message: String },

    /// Forbidden operation
    Forbidden { message: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidBody { message } => {
                write!(f, "Invalid request body: {}", message)
            }
            RequestError::Unauthorized { message } => {
                write!(f, "Unauthorized: {}", message)
            }
            RequestError::Forbidden { message } => {
                write!(f, "Forbidden: {}", message)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
        }
    }
}

impl From<RequestError> for CrudError {
    fn from(err: RequestError) -> Self {
        CrudError::Request(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<sqlx::Error> for CrudError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        let storage = match &err {
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                match db.kind() {
                    ErrorKind::UniqueViolation => StorageError::UniqueViolation { message },
                    ErrorKind::ForeignKeyViolation => {
                        StorageError::ForeignKeyViolation { message }
                    }
                    ErrorKind::NotNullViolation => StorageError::NotNullViolation { message },
                    ErrorKind::CheckViolation => StorageError::CheckViolation { message },
                    _ => StorageError::QueryError { message },
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_) => StorageError::ConnectionError {
                message: err.to_string(),
            },
            _ => StorageError::QueryError {
                message: err.to_string(),
            },
        };
        CrudError::Storage(storage)
    }
}

impl From<serde_json::Error> for CrudError {
    fn from(err: serde_json::Error) -> Self {
        CrudError::Request(RequestError::InvalidBody {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for CrudError {
    fn from(err: std::io::Error) -> Self {
        CrudError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for CrudError {
    fn from(err: serde_yaml::Error) -> Self {
        CrudError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for crud-rs operations
pub type CrudResult<T> = Result<T, CrudError>;

// =============================================================================
// Tests
// =============================================================================
