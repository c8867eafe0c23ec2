//! HTTP request parser module.
//!
//! Decodes HTTP/1.x requests, either from a complete byte slice or one at
//! a time from a buffered async stream carrying a persistent connection.

mod request;
mod method;
mod version;
mod headers;
mod reader;
mod error;

// Re-export public items
pub use request::HttpRequest;
pub use method::Method;
pub use version::HttpVersion;
pub use headers::Headers;
pub use reader::{ParseLimits, read_request};
pub use error::Error;

// Re-export the parse_request function
pub use request::parse_request;
