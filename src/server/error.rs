//! Error types for the worker.

use thiserror::Error;

use crate::parser::Error as ParserError;
use crate::server::app::AppError;

/// Errors that can occur during worker operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// `start_response` was called after the header block went out.
    #[error("Response headers were already sent")]
    HeadersAlreadySent,

    /// Body bytes were written before `start_response` was called.
    #[error("Response written before start_response was called")]
    ResponseNotStarted,

    /// The status line is not `<3-digit code> <reason>`.
    #[error("Invalid status line: {0:?}")]
    InvalidStatus(String),

    /// A response header name or value cannot be put on the wire.
    #[error("Invalid response header: {0:?}")]
    InvalidHeader(String),

    /// The application failed while producing a response.
    #[error("Application error: {0}")]
    Application(AppError),

    /// The application path is not of the form `module:callable`.
    #[error("Invalid application path: {0:?}")]
    InvalidAppPath(String),

    /// No application is registered under the given path.
    #[error("Application not found: {0}")]
    AppNotFound(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error was caused by the application rather than the peer or the socket.
    pub fn is_application_error(&self) -> bool {
        matches!(
            self,
            Error::Application(_)
                | Error::HeadersAlreadySent
                | Error::ResponseNotStarted
                | Error::InvalidStatus(_)
                | Error::InvalidHeader(_)
        )
    }
}
