//! The application boundary.
//!
//! An application receives the [`RequestContext`] of a request and a
//! [`StartResponse`] capability, and returns a [`Body`]: a lazy sequence of
//! byte chunks with an optional cleanup hook. The worker pulls chunks one at
//! a time and writes them to the client as they are produced.
//!
//! ```
//! use microworker::{Application, AppError, Body, Chunks, RequestContext, StartResponse};
//!
//! struct Greeter;
//!
//! impl Application for Greeter {
//!     fn call(&self, context: RequestContext, start_response: StartResponse) -> Result<Box<dyn Body>, AppError> {
//!         let body = format!("Hello from {}\n", context.path());
//!         start_response.start("200 OK", [
//!             ("Content-Type".to_string(), "text/plain".to_string()),
//!             ("Content-Length".to_string(), body.len().to_string()),
//!         ])?;
//!         Ok(Box::new(Chunks::once(body)))
//!     }
//! }
//! ```

use std::fmt;

use crate::server::environ::RequestContext;
pub use crate::server::writer::StartResponse;

/// Error type returned by application code.
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// A response body produced by an application.
pub trait Body: Send {
    /// The next chunk, `None` once the body is exhausted.
    fn next_chunk(&mut self) -> Option<Result<Vec<u8>, AppError>>;

    /// Release resources held by the body.
    ///
    /// The worker calls this exactly once per response, whether the body
    /// was fully written or not.
    fn close(&mut self) {}
}

/// An application callable.
pub trait Application: Send + Sync {
    fn call(&self, context: RequestContext, start_response: StartResponse) -> Result<Box<dyn Body>, AppError>;
}

impl<F> Application for F
where
    F: Fn(RequestContext, StartResponse) -> Result<Box<dyn Body>, AppError> + Send + Sync,
{
    fn call(&self, context: RequestContext, start_response: StartResponse) -> Result<Box<dyn Body>, AppError> {
        self(context, start_response)
    }
}

/// A body made of chunks that are already in memory.
#[derive(Debug, Default)]
pub struct Chunks {
    chunks: std::vec::IntoIter<Vec<u8>>,
}

impl Chunks {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter(),
        }
    }

    pub fn once(chunk: impl Into<Vec<u8>>) -> Self {
        Self::new(vec![chunk.into()])
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl Body for Chunks {
    fn next_chunk(&mut self) -> Option<Result<Vec<u8>, AppError>> {
        self.chunks.next().map(Ok)
    }
}

/// A body backed by an iterator, with an optional close hook.
pub struct IterBody<I> {
    iter: I,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl<I> IterBody<I>
where
    I: Iterator<Item = Result<Vec<u8>, AppError>> + Send,
{
    pub fn new(iter: I) -> Self {
        Self { iter, on_close: None }
    }

    /// Run `hook` when the worker closes the body.
    pub fn on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }
}

impl<I> Body for IterBody<I>
where
    I: Iterator<Item = Result<Vec<u8>, AppError>> + Send,
{
    fn next_chunk(&mut self) -> Option<Result<Vec<u8>, AppError>> {
        self.iter.next()
    }

    fn close(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl<I> fmt::Debug for IterBody<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterBody")
            .field("has_close_hook", &self.on_close.is_some())
            .finish()
    }
}
