//! HTTP worker implementation for microworker.
//!
//! This module accepts connections on a pre-bound socket, runs each one
//! through a request loop under a bounded pool, and hands requests to an
//! [`Application`] through a WSGI-style contract.

mod app;
mod config;
mod connection;
mod environ;
mod error;
mod pool;
mod registry;
mod response;
mod supervisor;
mod worker;
mod writer;

// Re-export public items
pub use app::{AppError, Application, Body, Chunks, IterBody};
pub use config::WorkerConfig;
pub use connection::{Connection, ConnectionState};
pub use environ::{build_environ, header_key, keys, ConnectionInfo, RequestBody, RequestContext};
pub use error::Error;
pub use pool::{PoolSlot, WorkerPool};
pub use registry::{split_app_path, AppRegistry};
pub use response::{HttpResponse, StatusCode};
pub use supervisor::{ParentWatch, ShutdownHandle, ShutdownReason};
pub use worker::Worker;
pub use writer::{ResponseState, ResponseWriter, StartResponse};
