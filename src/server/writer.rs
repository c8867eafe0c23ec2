//! Response framing: the `start_response` capability and the body writer.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::server::error::Error;

/// Status and headers of the response being produced for one request.
#[derive(Debug, Default)]
pub struct ResponseState {
    status: Option<String>,
    headers: Vec<(String, String)>,
    headers_sent: bool,
    wrote_connection_close: bool,
}

fn lock(state: &Mutex<ResponseState>) -> MutexGuard<'_, ResponseState> {
    // A panicking application must not wedge the connection.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn validate_status(status: &str) -> Result<(), Error> {
    let bytes = status.as_bytes();
    let valid = bytes.len() >= 3
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && (bytes.len() == 3 || bytes[3] == b' ')
        && !bytes.iter().any(|&b| b == b'\r' || b == b'\n');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidStatus(status.to_string()))
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), Error> {
    let name_ok = !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':');
    let value_ok = !value.bytes().any(|b| b == b'\r' || b == b'\n');
    if name_ok && value_ok {
        Ok(())
    } else {
        Err(Error::InvalidHeader(format!("{name}: {value}")))
    }
}

/// The capability an application uses to set the response status and headers.
///
/// Cheap to clone; an application may keep it inside its body and call it
/// lazily. Each call replaces the pending status and headers until the
/// header block has been written, after which calls fail with
/// [`Error::HeadersAlreadySent`].
#[derive(Debug, Clone)]
pub struct StartResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl StartResponse {
    /// Set the status line (for example `"200 OK"`) and the response headers.
    pub fn start<N, V>(&self, status: impl Into<String>, headers: impl IntoIterator<Item = (N, V)>) -> Result<(), Error>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let status = status.into();
        validate_status(&status)?;
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(n, v)| (n.into(), v.into()))
            .collect();
        for (name, value) in &headers {
            validate_header(name, value)?;
        }

        let mut state = lock(&self.state);
        if state.headers_sent {
            return Err(Error::HeadersAlreadySent);
        }
        state.status = Some(status);
        state.headers = headers;
        Ok(())
    }

    /// Whether the header block has already been written.
    pub fn headers_sent(&self) -> bool {
        lock(&self.state).headers_sent
    }
}

// No body may follow these statuses.
fn status_forbids_body(status: &str) -> bool {
    status.starts_with('1') || status.starts_with("204") || status.starts_with("304")
}

/// Writes one response to the connection.
///
/// The header block is serialized on the first [`write`](Self::write) and
/// is followed by the body chunks in call order. Server headers supplied
/// by the connection handler go after the application's headers and
/// replace any application header of the same name.
#[derive(Debug)]
pub struct ResponseWriter {
    state: Arc<Mutex<ResponseState>>,
    server_headers: Vec<(String, String)>,
    head_only: bool,
    force_close: bool,
    declared_length: Option<u64>,
    body_bytes: u64,
}

impl ResponseWriter {
    /// Create a writer. `head_only` drops body bytes, as for a HEAD request.
    pub fn new(server_headers: Vec<(String, String)>, head_only: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ResponseState::default())),
            server_headers,
            head_only,
            force_close: false,
            declared_length: None,
            body_bytes: 0,
        }
    }

    /// A `start_response` handle bound to this response.
    pub fn start_response(&self) -> StartResponse {
        StartResponse {
            state: self.state.clone(),
        }
    }

    /// Whether `start_response` has been called.
    pub fn has_started(&self) -> bool {
        lock(&self.state).status.is_some()
    }

    pub fn headers_sent(&self) -> bool {
        lock(&self.state).headers_sent
    }

    /// Whether the header block that went out carried `Connection: close`.
    pub fn wrote_connection_close(&self) -> bool {
        lock(&self.state).wrote_connection_close
    }

    /// Make the header block carry `Connection: close` if it has not been sent yet.
    pub fn force_close(&mut self) {
        self.force_close = true;
    }

    /// Whether the bytes sent match the declared `Content-Length`.
    ///
    /// When they do not, the peer cannot find the start of the next
    /// response and the connection has to be closed.
    pub fn framing_intact(&self) -> bool {
        self.head_only || self.declared_length.map_or(true, |len| len == self.body_bytes)
    }

    /// Write a body chunk, sending the header block first if needed.
    ///
    /// An empty chunk still flushes the header block.
    pub async fn write<W>(&mut self, out: &mut W, data: &[u8]) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = if self.headers_sent() {
            Vec::with_capacity(data.len())
        } else {
            self.header_block()?
        };

        if !self.head_only {
            buf.extend_from_slice(data);
            self.body_bytes += data.len() as u64;
        }

        if !buf.is_empty() {
            out.write_all(&buf).await?;
            out.flush().await?;
        }
        Ok(())
    }

    /// Serialize the header block and mark the headers as sent.
    fn header_block(&mut self) -> Result<Vec<u8>, Error> {
        let mut state = lock(&self.state);
        let status = state.status.clone().ok_or(Error::ResponseNotStarted)?;

        let mut headers = state.headers.clone();
        headers.retain(|(k, _)| !self.server_headers.iter().any(|(name, _)| name.eq_ignore_ascii_case(k)));
        headers.extend(self.server_headers.iter().cloned());

        self.declared_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.trim().parse::<u64>().ok());

        // Without chunked coding the only way to delimit an unsized body is to close.
        let unsized_body = self.declared_length.is_none() && !self.head_only && !status_forbids_body(&status);
        if self.force_close || unsized_body {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Connection"));
            headers.push(("Connection".to_string(), "close".to_string()));
        }

        state.wrote_connection_close = headers.iter().any(|(k, v)| {
            k.eq_ignore_ascii_case("Connection") && v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close"))
        });

        let mut block = format!("HTTP/1.1 {status}\r\n");
        for (name, value) in &headers {
            block.push_str(name);
            block.push_str(": ");
            block.push_str(value);
            block.push_str("\r\n");
        }
        block.push_str("\r\n");

        state.headers_sent = true;
        Ok(block.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_headers() -> Vec<(String, String)> {
        vec![("Server".to_string(), "test".to_string())]
    }

    #[tokio::test]
    async fn writes_header_block_then_chunks_in_order() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(server_headers(), false);
        writer
            .start_response()
            .start("200 OK", [("Content-Type", "text/plain"), ("Content-Length", "11")])
            .unwrap();

        for chunk in [&b"hello"[..], b"", b" ", b"world"] {
            writer.write(&mut out, chunk).await.unwrap();
        }

        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 11\r\nServer: test\r\n\r\nhello world"
        );
        assert!(writer.framing_intact());
        assert!(!writer.wrote_connection_close());
    }

    #[tokio::test]
    async fn empty_write_flushes_headers() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(Vec::new(), false);
        writer.start_response().start("204 No Content", Vec::<(String, String)>::new()).unwrap();

        writer.write(&mut out, b"").await.unwrap();

        assert_eq!(out, b"HTTP/1.1 204 No Content\r\n\r\n");
        assert!(writer.headers_sent());
    }

    #[tokio::test]
    async fn start_response_replaces_pending_headers() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(Vec::new(), false);
        let start = writer.start_response();
        start.start("200 OK", [("X-First", "1")]).unwrap();
        start.start("500 Internal Server Error", [("Content-Length", "0")]).unwrap();

        writer.write(&mut out, b"").await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(!text.contains("X-First"));
    }

    #[tokio::test]
    async fn start_response_after_headers_sent_fails() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(Vec::new(), false);
        let start = writer.start_response();
        start.start("200 OK", [("Content-Length", "1")]).unwrap();
        writer.write(&mut out, b"x").await.unwrap();

        let result = start.start("500 Internal Server Error", Vec::<(String, String)>::new());
        assert!(matches!(result, Err(Error::HeadersAlreadySent)));
        assert!(start.headers_sent());
    }

    #[tokio::test]
    async fn write_before_start_fails() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(Vec::new(), false);
        let result = writer.write(&mut out, b"data").await;
        assert!(matches!(result, Err(Error::ResponseNotStarted)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn missing_content_length_closes() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(
            vec![("Connection".to_string(), "keep-alive".to_string())],
            false,
        );
        writer.start_response().start("200 OK", [("Content-Type", "text/plain")]).unwrap();
        writer.write(&mut out, b"streamed").await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Connection: close\r\n"));
        assert!(!text.contains("keep-alive"));
        assert!(writer.wrote_connection_close());
    }

    #[tokio::test]
    async fn server_close_header_is_recorded() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(vec![("Connection".to_string(), "close".to_string())], false);
        writer.start_response().start("200 OK", [("Content-Length", "0")]).unwrap();
        writer.write(&mut out, b"").await.unwrap();
        assert!(writer.wrote_connection_close());
    }

    #[tokio::test]
    async fn server_headers_replace_application_copies() {
        let mut out = Vec::new();
        let server = vec![
            ("Server".to_string(), "test".to_string()),
            ("Connection".to_string(), "close".to_string()),
        ];
        let mut writer = ResponseWriter::new(server, false);
        writer
            .start_response()
            .start(
                "200 OK",
                [("server", "app/1.0"), ("Connection", "keep-alive"), ("Content-Length", "0"), ("X-App", "1")],
            )
            .unwrap();
        writer.write(&mut out, b"").await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nX-App: 1\r\nServer: test\r\nConnection: close\r\n\r\n"
        );
        assert!(writer.wrote_connection_close());
    }

    #[tokio::test]
    async fn head_only_drops_body() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(Vec::new(), true);
        writer.start_response().start("200 OK", [("Content-Length", "5")]).unwrap();
        writer.write(&mut out, b"hello").await.unwrap();

        assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n");
        assert!(writer.framing_intact());
    }

    #[tokio::test]
    async fn short_body_breaks_framing() {
        let mut out = Vec::new();
        let mut writer = ResponseWriter::new(Vec::new(), false);
        writer.start_response().start("200 OK", [("Content-Length", "10")]).unwrap();
        writer.write(&mut out, b"short").await.unwrap();
        assert!(!writer.framing_intact());
    }

    #[test]
    fn rejects_bad_status_and_headers() {
        let writer = ResponseWriter::new(Vec::new(), false);
        let start = writer.start_response();
        assert!(matches!(start.start("OK", Vec::<(String, String)>::new()), Err(Error::InvalidStatus(_))));
        assert!(matches!(
            start.start("200 OK", [("X-Bad", "a\r\nInjected: yes")]),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(start.start("200 OK", [("Bad Name", "v")]), Err(Error::InvalidHeader(_))));
        assert!(!writer.has_started());
    }
}
