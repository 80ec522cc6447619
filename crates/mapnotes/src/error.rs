//! Error types for mapnotes.
//!
//! Every failure a request can hit is a variant here. The request handler
//! renders any of them into a `{success: false, message}` envelope using the
//! `Display` text, so the messages double as the wire contract for the
//! front-end.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for mapnotes operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Request Errors ===
    /// An update or delete request did not carry an id.
    #[error("缺少 ID")]
    MissingId,

    /// No row carries the requested id.
    #[error("找不到此筆資料")]
    RecordNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A create request supplied an id that is already stored.
    #[error("duplicate id: {id}")]
    DuplicateId {
        /// The conflicting id.
        id: String,
    },

    /// The request body was valid JSON but not a usable request.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the request.
        message: String,
    },

    /// The JSONP callback name is not a plain JavaScript identifier path.
    #[error("invalid callback name: {name}")]
    InvalidCallback {
        /// The rejected callback name.
        name: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The configured sheet does not exist.
    #[error("找不到工作表：{name}")]
    SheetNotFound {
        /// Name of the missing sheet.
        name: String,
    },

    /// A grid primitive was called with coordinates it cannot honor.
    #[error("grid error: {0}")]
    Grid(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read the front-end config template.
    #[error("failed to read template {path}: {source}")]
    TemplateRead {
        /// Path to the template file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for mapnotes operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new grid error.
    #[must_use]
    pub fn grid(message: impl Into<String>) -> Self {
        Self::Grid(message.into())
    }

    /// Create a new invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a record not found error.
    #[must_use]
    pub fn record_not_found(id: impl Into<String>) -> Self {
        Self::RecordNotFound { id: id.into() }
    }

    /// Check if this error was caused by the caller rather than the store.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingId
                | Self::RecordNotFound { .. }
                | Self::DuplicateId { .. }
                | Self::InvalidRequest { .. }
                | Self::InvalidCallback { .. }
                | Self::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_messages() {
        assert_eq!(Error::MissingId.to_string(), "缺少 ID");
        assert_eq!(Error::record_not_found("x").to_string(), "找不到此筆資料");
        let err = Error::SheetNotFound {
            name: "回報".to_string(),
        };
        assert_eq!(err.to_string(), "找不到工作表：回報");
    }

    #[test]
    fn test_error_is_client_error() {
        assert!(Error::MissingId.is_client_error());
        assert!(Error::invalid_request("body must be an object").is_client_error());
        assert!(!Error::grid("row 0").is_client_error());
    }

    #[test]
    fn test_grid_error() {
        let err = Error::grid("row 0 is out of range");
        assert_eq!(err.to_string(), "grid error: row 0 is out of range");
    }

    #[test]
    fn test_duplicate_id_display() {
        let err = Error::DuplicateId {
            id: "20250101120000_abc123".to_string(),
        };
        assert!(err.to_string().contains("20250101120000_abc123"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn test_template_read_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::TemplateRead {
            path: PathBuf::from("config.template.json"),
            source: io_err,
        };
        assert!(err.to_string().contains("config.template.json"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "port must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("port"));
    }
}
