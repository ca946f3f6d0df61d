//! Error types for seatable-mysync.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for seatable-mysync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
        /// Source error if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// MySQL connection error
    #[error("MySQL connection error: {message}")]
    MysqlConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<sqlx::Error>,
    },

    /// SQL query error
    #[error("Query error for dataset '{dataset}': {message}")]
    Query {
        /// Dataset description the query belongs to
        dataset: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<sqlx::Error>,
    },

    /// SeaTable API error
    #[error("SeaTable API error: {message}")]
    Api {
        /// Error message
        message: String,
        /// HTTP status code if the server responded
        status: Option<u16>,
        /// Source error
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The destination table could not be verified empty
    #[error("Unable to clear table '{table}': {remaining} rows remain")]
    ClearTable {
        /// Destination table name
        table: String,
        /// Rows still visible after the last round
        remaining: usize,
    },

    /// Batch append failure (fatal for the task)
    #[error("Insert into '{table}' failed on chunk {chunk}: {message}")]
    Insert {
        /// Destination table name
        table: String,
        /// Zero-based index of the failed chunk
        chunk: usize,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<Error>>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a MySQL connection error.
    pub fn mysql_connection(message: impl Into<String>, source: sqlx::Error) -> Self {
        Self::MysqlConnection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a query error.
    pub fn query(dataset: impl Into<String>, message: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Query {
            dataset: dataset.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an API error from a failed request.
    pub fn api(message: impl Into<String>, source: reqwest::Error) -> Self {
        let status = source.status().map(|s| s.as_u16());
        Self::Api {
            message: message.into(),
            status,
            source: Some(source),
        }
    }

    /// Create an API error from an unexpected response status.
    pub fn api_status(message: impl Into<String>, status: u16) -> Self {
        Self::Api {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Create an insert error for a failed chunk.
    pub fn insert(table: impl Into<String>, chunk: usize, source: Error) -> Self {
        Self::Insert {
            table: table.into(),
            chunk,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::MysqlConnection { .. } | Error::Io(_) => true,
            Error::Api { status, source, .. } => {
                // Transport failures and server-side errors are worth another
                // attempt; 4xx responses are not.
                match status {
                    Some(code) => *code >= 500,
                    None => source.as_ref().is_some_and(|e| e.is_timeout() || e.is_connect()),
                }
            }
            _ => false,
        }
    }

    /// Get the error code for metrics/logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::MysqlConnection { .. } => "MYSQL_CONNECTION_ERROR",
            Error::Query { .. } => "QUERY_ERROR",
            Error::Api { .. } => "API_ERROR",
            Error::ClearTable { .. } => "CLEAR_TABLE_ERROR",
            Error::Insert { .. } => "INSERT_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

/// Error context extension trait.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ErrorContext<T>
    for std::result::Result<T, E>
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::config_with_source(message, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::config_with_source(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::config("test").code(), "CONFIG_ERROR");
        assert_eq!(Error::validation("test").code(), "VALIDATION_ERROR");
        assert_eq!(
            Error::ClearTable {
                table: "t".into(),
                remaining: 3
            }
            .code(),
            "CLEAR_TABLE_ERROR"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(!Error::config("test").is_retryable());
        assert!(!Error::validation("test").is_retryable());
        assert!(Error::api_status("server blew up", 503).is_retryable());
        assert!(!Error::api_status("bad token", 403).is_retryable());
    }

    #[test]
    fn test_insert_error_display() {
        let inner = Error::api_status("boom", 500);
        let err = Error::insert("Contracts", 2, inner);
        let text = err.to_string();
        assert!(text.contains("Contracts"));
        assert!(text.contains("chunk 2"));
    }
}
