//! Per-connection request loop.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, error, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::parser::{read_request, HttpRequest, HttpVersion, Method};
use crate::server::app::{AppError, Application, Body};
use crate::server::config::WorkerConfig;
use crate::server::environ::{build_environ, ConnectionInfo};
use crate::server::error::Error;
use crate::server::response::{HttpResponse, StatusCode};
use crate::server::writer::ResponseWriter;

/// Where a connection is in its request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequest,
    Parsing,
    Dispatching,
    WritingResponse,
    Closing,
    Closed,
}

// Next step after a request has been handled.
enum Next {
    AwaitRequest,
    Close,
}

/// How a response cycle ended.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Complete,
    ApplicationFailed,
    WriteFailed,
}

fn panic_message(payload: Box<dyn Any + Send>) -> AppError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("application panicked: {message}").into()
}

/// Runs the body's close hook exactly once, including on early return.
struct BodyGuard {
    body: Option<Box<dyn Body>>,
}

impl BodyGuard {
    fn new(body: Box<dyn Body>) -> Self {
        Self { body: Some(body) }
    }

    fn next_chunk(&mut self) -> Option<Result<Vec<u8>, AppError>> {
        let body = self.body.as_mut()?;
        match catch_unwind(AssertUnwindSafe(|| body.next_chunk())) {
            Ok(chunk) => chunk,
            Err(payload) => Some(Err(panic_message(payload))),
        }
    }

    fn close(&mut self) {
        if let Some(mut body) = self.body.take() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| body.close())) {
                error!("Error closing response body: {}", panic_message(payload));
            }
        }
    }
}

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serves the requests arriving on one connection, in order.
pub struct Connection<S> {
    stream: BufReader<S>,
    info: ConnectionInfo,
    app: Arc<dyn Application>,
    config: Arc<WorkerConfig>,
    state: ConnectionState,
    requests_served: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, info: ConnectionInfo, app: Arc<dyn Application>, config: Arc<WorkerConfig>) -> Self {
        Self {
            stream: BufReader::with_capacity(config.read_buffer_size, stream),
            info,
            app,
            config,
            state: ConnectionState::AwaitingRequest,
            requests_served: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Serve requests until the connection closes. Returns the number of
    /// requests that were dispatched to the application.
    ///
    /// Never fails: protocol, application and I/O errors all end in closing
    /// the connection.
    pub async fn run(&mut self) -> usize {
        loop {
            let next = self.serve_one().await;
            if matches!(next, Next::Close) {
                break;
            }
        }
        self.close().await;
        self.requests_served
    }

    async fn serve_one(&mut self) -> Next {
        self.state = ConnectionState::AwaitingRequest;
        let peer = self.info.peer;

        let read = tokio::time::timeout(self.config.request_timeout, async {
            // Idle until the first byte of the next request arrives.
            self.stream.fill_buf().await?;
            self.state = ConnectionState::Parsing;
            read_request(&mut self.stream, &self.config.limits).await
        })
        .await;

        let request = match read {
            Err(_) => {
                debug!("Request from {peer} timed out");
                return Next::Close;
            }
            Ok(Err(e)) if e.is_disconnect() => {
                debug!("Connection from {peer} ended: {e}");
                return Next::Close;
            }
            Ok(Err(e)) => {
                warn!("Bad request from {peer}: {e}");
                let response = HttpResponse::new(StatusCode::BadRequest)
                    .with_content_type("text/plain")
                    .with_header("Connection", "close")
                    .with_body_string(format!("Bad request: {e}"));
                if let Err(e) = self.stream.write_all(&response.to_bytes()).await {
                    debug!("Error sending 400 to {peer}: {e}");
                }
                return Next::Close;
            }
            Ok(Ok(request)) => request,
        };

        let keep_alive = request.keep_alive();
        let (outcome, writer) = self.respond(request, keep_alive).await;
        self.requests_served += 1;

        if outcome == Outcome::Complete && keep_alive && !writer.wrote_connection_close() && writer.framing_intact() {
            Next::AwaitRequest
        } else {
            Next::Close
        }
    }

    fn server_headers(&self, request: &HttpRequest, keep_alive: bool) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Server".to_string(), self.config.server_software.clone()),
            ("Date".to_string(), httpdate::fmt_http_date(SystemTime::now())),
        ];
        if !keep_alive {
            headers.push(("Connection".to_string(), "close".to_string()));
        } else if request.version == HttpVersion::Http10 {
            headers.push(("Connection".to_string(), "keep-alive".to_string()));
        }
        headers
    }

    async fn respond(&mut self, request: HttpRequest, keep_alive: bool) -> (Outcome, ResponseWriter) {
        self.state = ConnectionState::Dispatching;
        let head_only = request.method == Method::HEAD;
        let mut writer = ResponseWriter::new(self.server_headers(&request, keep_alive), head_only);
        let target = format!("{} {}", request.method, request.path);

        let context = build_environ(request, &self.info);
        let start_response = writer.start_response();
        let app = self.app.clone();
        let called = catch_unwind(AssertUnwindSafe(|| app.call(context, start_response)))
            .unwrap_or_else(|payload| Err(panic_message(payload)));

        let body = match called {
            Ok(body) => body,
            Err(e) => {
                let outcome = self.recover(&mut writer, &target, Error::Application(e)).await;
                return (outcome, writer);
            }
        };

        self.state = ConnectionState::WritingResponse;
        let mut body = BodyGuard::new(body);
        while let Some(chunk) = body.next_chunk() {
            let result = match chunk {
                Ok(bytes) => writer.write(&mut self.stream, &bytes).await,
                Err(e) => Err(Error::Application(e)),
            };
            if let Err(e) = result {
                body.close();
                let outcome = self.handle_failure(&mut writer, &target, e).await;
                return (outcome, writer);
            }
        }

        // An application that produced no chunks still gets its headers out.
        let flushed = if writer.headers_sent() {
            Ok(())
        } else {
            writer.write(&mut self.stream, b"").await
        };
        body.close();

        let outcome = match flushed {
            Ok(()) => Outcome::Complete,
            Err(e) => self.handle_failure(&mut writer, &target, e).await,
        };
        (outcome, writer)
    }

    async fn handle_failure(&mut self, writer: &mut ResponseWriter, target: &str, e: Error) -> Outcome {
        if e.is_application_error() {
            self.recover(writer, target, e).await
        } else {
            debug!("Error writing response for {target} to {peer}: {e}", peer = self.info.peer);
            Outcome::WriteFailed
        }
    }

    /// Fail-safe after an application error.
    ///
    /// Before the header block goes out, the client still gets a response:
    /// the status the application chose with an empty body, or a 500 if it
    /// never called `start_response`. Afterwards nothing can be amended and
    /// the connection is simply closed.
    async fn recover(&mut self, writer: &mut ResponseWriter, target: &str, e: Error) -> Outcome {
        error!("Application error handling {target} from {peer}: {e}", peer = self.info.peer);

        if writer.headers_sent() {
            return Outcome::ApplicationFailed;
        }

        writer.force_close();
        if writer.has_started() {
            match writer.write(&mut self.stream, b"").await {
                Ok(()) => return Outcome::ApplicationFailed,
                Err(e) if !e.is_application_error() => {
                    debug!("Error flushing headers for {target}: {e}");
                    return Outcome::ApplicationFailed;
                }
                Err(_) => {}
            }
        }

        let response = HttpResponse::new(StatusCode::InternalServerError)
            .with_content_type("text/plain")
            .with_header("Connection", "close")
            .with_body_string("Internal Server Error");
        if let Err(e) = self.stream.write_all(&response.to_bytes()).await {
            debug!("Error sending 500 for {target}: {e}");
        }
        Outcome::ApplicationFailed
    }

    /// Flush and shut down the connection. Errors are logged, never returned.
    async fn close(&mut self) {
        self.state = ConnectionState::Closing;
        if let Err(e) = self.stream.flush().await {
            debug!("Error flushing connection to {peer}: {e}", peer = self.info.peer);
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error closing connection to {peer}: {e}", peer = self.info.peer);
        }
        self.state = ConnectionState::Closed;
    }
}
