//! Error types for the reconciliation engine

use thiserror::Error;

/// Boxed error raised by a transport (driver) implementation.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// A connection could not be opened or pinged
    #[error("could not connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: DriverError,
    },

    /// A referenced role or database does not exist
    #[error("{kind} `{name}` does not exist")]
    NotFound { kind: &'static str, name: String },

    /// The server rejected a statement or a catalog lookup
    #[error("failed to {purpose}: {source}")]
    Statement {
        purpose: String,
        #[source]
        source: DriverError,
    },

    /// A declaration cannot be expressed on the target server
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),
}

impl Error {
    pub fn connection(target: impl Into<String>, source: impl Into<DriverError>) -> Self {
        Error::Connection {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn statement(purpose: impl Into<String>, source: impl Into<DriverError>) -> Self {
        Error::Statement {
            purpose: purpose.into(),
            source: source.into(),
        }
    }

    pub fn role_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "role",
            name: name.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidDeclaration(message.into())
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
