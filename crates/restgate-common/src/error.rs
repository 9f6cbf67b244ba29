//! Error types for restgate

use thiserror::Error;

/// Result type alias for restgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Unified error type for all restgate operations
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Composite key error: {0}")]
    CompositeKey(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Authentication required")]
    AuthMissing,

    #[error("Invalid token: {0}")]
    AuthInvalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // MySQL-specific error classes for better error handling

    /// Unique constraint violation (MySQL error 1062)
    #[error("Conflict: {message}")]
    Conflict { code: u32, message: String },

    /// Foreign key constraint violation (MySQL errors 1451, 1452)
    #[error("Foreign key constraint violation: {message}")]
    ForeignKey { code: u32, message: String },

    /// Any other driver error that carries a MySQL error number
    #[error("Driver error {code}: {message}")]
    Driver { code: u32, message: String },

    /// Deadlock detected (MySQL error 1213) - retryable
    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    /// Connection or pool timeout - retryable
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient error that may succeed on retry
    #[error("Transient error: {0}")]
    Transient(String),
}

impl GatewayError {
    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Deadlock(_) | GatewayError::Timeout(_) | GatewayError::Transient(_)
        )
    }

    /// Returns true if this is a constraint violation error
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            GatewayError::Conflict { .. } | GatewayError::ForeignKey { .. }
        )
    }

    /// Returns the MySQL error number when the driver reported one
    pub fn driver_code(&self) -> Option<u32> {
        match self {
            GatewayError::Conflict { code, .. }
            | GatewayError::ForeignKey { code, .. }
            | GatewayError::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

// MySQL-specific error conversions (when mysql-errors feature is enabled)
#[cfg(feature = "mysql-errors")]
impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        match &err {
            Error::Configuration(_) => GatewayError::Connection(err.to_string()),
            Error::Database(db_err) => {
                // Classify based on MySQL error numbers
                // See: https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html
                let number = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number() as u32);
                if let Some(number) = number {
                    let message = db_err.message().to_string();
                    return match number {
                        // Duplicate entry for unique key
                        1062 | 1586 => GatewayError::Conflict {
                            code: number,
                            message,
                        },
                        // Row referenced by / references a missing parent
                        1451 | 1452 => GatewayError::ForeignKey {
                            code: number,
                            message,
                        },
                        // Column cannot be null
                        1048 => GatewayError::Validation(message),
                        // Deadlock found when trying to get lock
                        1213 => GatewayError::Deadlock(message),
                        // Lock wait timeout exceeded (can retry)
                        1205 => GatewayError::Transient(message),
                        _ => GatewayError::Driver {
                            code: number,
                            message,
                        },
                    };
                }
                GatewayError::Database(err.to_string())
            }
            Error::Io(_) => GatewayError::Connection(err.to_string()),
            Error::Tls(_) => GatewayError::Connection(err.to_string()),
            Error::Protocol(_) => GatewayError::Connection(err.to_string()),
            Error::RowNotFound => GatewayError::Query("Row not found".to_string()),
            Error::TypeNotFound { .. } => GatewayError::Serialization(err.to_string()),
            Error::ColumnIndexOutOfBounds { .. } => GatewayError::Query(err.to_string()),
            Error::ColumnNotFound(_) => GatewayError::Query(err.to_string()),
            Error::ColumnDecode { .. } => GatewayError::Serialization(err.to_string()),
            Error::Decode(_) => GatewayError::Serialization(err.to_string()),
            Error::PoolTimedOut => GatewayError::Timeout("Connection pool timed out".to_string()),
            Error::PoolClosed => GatewayError::Connection("Connection pool closed".to_string()),
            Error::WorkerCrashed => GatewayError::Internal("Worker thread crashed".to_string()),
            _ => GatewayError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_database() {
        let err = GatewayError::Database("invalid query".to_string());
        assert_eq!(err.to_string(), "Database error: invalid query");
    }

    #[test]
    fn test_error_display_connection() {
        let err = GatewayError::Connection("timeout".to_string());
        assert_eq!(err.to_string(), "Connection error: timeout");
    }

    #[test]
    fn test_error_display_composite_key() {
        let err = GatewayError::CompositeKey("expected 2 components, got 1".to_string());
        assert_eq!(
            err.to_string(),
            "Composite key error: expected 2 components, got 1"
        );
    }

    #[test]
    fn test_error_display_conflict() {
        let err = GatewayError::Conflict {
            code: 1062,
            message: "Duplicate entry 'X' for key 'PRIMARY'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Conflict: Duplicate entry 'X' for key 'PRIMARY'"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(GatewayError::Deadlock("test".to_string()).is_retryable());
        assert!(GatewayError::Timeout("test".to_string()).is_retryable());
        assert!(GatewayError::Transient("test".to_string()).is_retryable());
        assert!(!GatewayError::Query("test".to_string()).is_retryable());
        assert!(!GatewayError::Conflict {
            code: 1062,
            message: "test".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_is_constraint_violation() {
        assert!(GatewayError::Conflict {
            code: 1062,
            message: "test".to_string()
        }
        .is_constraint_violation());
        assert!(GatewayError::ForeignKey {
            code: 1452,
            message: "test".to_string()
        }
        .is_constraint_violation());
        assert!(!GatewayError::Deadlock("test".to_string()).is_constraint_violation());
    }

    #[test]
    fn test_driver_code() {
        let err = GatewayError::Driver {
            code: 1146,
            message: "Table 'db.missing' doesn't exist".to_string(),
        };
        assert_eq!(err.driver_code(), Some(1146));
        assert_eq!(GatewayError::AuthMissing.driver_code(), None);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }
}
