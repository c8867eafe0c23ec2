//! Error types for the HTTP parser.

use thiserror::Error;

/// Errors that can occur while reading an HTTP request.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer closed the connection before sending any part of a request.
    ///
    /// This is the normal end of an idle keep-alive connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The peer closed the connection in the middle of a request.
    #[error("Connection closed before the request was complete")]
    Incomplete,

    /// The HTTP method token contains invalid characters.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request target is empty.
    #[error("Invalid HTTP path")]
    InvalidPath,

    /// The request line is malformed (wrong format or missing components).
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The HTTP version in the request is not supported.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A header line has an invalid format.
    #[error("Invalid header format: {0}")]
    InvalidHeaderFormat(String),

    /// The Content-Length header is not a non-negative integer.
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// A transfer coding was requested; only fixed-length bodies are supported.
    #[error("Unsupported Transfer-Encoding: {0}")]
    UnsupportedTransferEncoding(String),

    /// A configured size limit was exceeded.
    #[error("Request too large: {0}")]
    TooLarge(&'static str),

    /// I/O error while reading from the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the peer went away rather than sent garbage.
    ///
    /// Disconnects end the connection without a response.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed | Error::Incomplete => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
