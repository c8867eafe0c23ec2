//! A minimal HTTP/1.1 worker.
//!
//! The worker serves one application on a listening socket handed to it by
//! a parent process. Connections are persistent: each one is read request
//! by request, in order, until the client or the response asks to close.
//! Concurrency is bounded by a pool, and the worker stops on its own when
//! its parent process goes away.
//!
//! # Features
//!
//! - Incremental HTTP/1.0 and HTTP/1.1 request parsing with size limits
//! - Keep-alive and pipelined requests, fixed-length bodies
//! - WSGI-style application contract with streamed response bodies
//! - Bounded concurrent connections with accept backpressure
//! - Orphan detection and graceful shutdown
//!
//! # Examples
//!
//! ## Parsing a request
//!
//! ```
//! use microworker::parse_request;
//!
//! let request = parse_request(b"GET /index.html?page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
//! assert_eq!(request.path, "/index.html");
//! assert_eq!(request.query, "page=2");
//! assert_eq!(request.get_header("host"), Some("example.com"));
//! ```
//!
//! ## Error handling
//!
//! ```
//! use microworker::{parse_request, ParserError};
//!
//! match parse_request(b"GET /index.html HTTP/9.9\r\n\r\n") {
//!     Ok(_) => println!("Request parsed successfully"),
//!     Err(ParserError::InvalidVersion(version)) => println!("Invalid version: {version}"),
//!     Err(ParserError::MalformedRequestLine(line)) => println!("Malformed request line: {line}"),
//!     Err(err) => println!("Other error: {err}"),
//! }
//! ```
//!
//! ## Serving an application
//!
//! ```no_run
//! use microworker::{AppRegistry, Worker, WorkerConfig};
//!
//! # async fn run() -> Result<(), microworker::ServerError> {
//! let app = AppRegistry::with_demos().resolve("demo:hello")?;
//! let listener = std::net::TcpListener::bind("127.0.0.1:8000")?;
//! let worker = Worker::new(listener, app, WorkerConfig::default())?;
//! let reason = worker.run().await?;
//! println!("stopped: {reason}");
//! # Ok(())
//! # }
//! ```

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, Headers, HttpRequest, HttpVersion, Method, ParseLimits, parse_request, read_request};
pub use server::{
    AppError, AppRegistry, Application, Body, Chunks, Error as ServerError, IterBody, RequestContext, ShutdownReason,
    StartResponse, Worker, WorkerConfig,
};
