//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::str::FromStr;

use crate::parser::error::Error;
use crate::parser::headers::Headers;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Represents an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path, without the query string
    pub path: String,
    /// The raw query string, without the leading `?`
    pub query: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: Headers,
    /// The request body
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a new HTTP request with an empty body.
    ///
    /// `target` is split at the first `?` into path and query.
    pub fn new(method: Method, target: &str, version: HttpVersion, headers: Headers) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target.to_string(), String::new()),
        };

        Self {
            method,
            path,
            query,
            version,
            headers,
            body: Vec::new(),
        }
    }

    /// Create a new HTTP request with a body.
    pub fn with_body(method: Method, target: &str, version: HttpVersion, headers: Headers, body: Vec<u8>) -> Self {
        let mut request = Self::new(method, target, version, headers);
        request.body = body;
        request
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Decode the query string into a map. Later duplicates win.
    pub fn query_params(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .into_owned()
            .collect()
    }

    /// Whether the client asked for the connection to stay open after this request.
    ///
    /// `Connection: close` always closes and `Connection: keep-alive` always
    /// keeps. Without either token HTTP/1.1 keeps the connection and HTTP/1.0
    /// closes it.
    pub fn keep_alive(&self) -> bool {
        if self.headers.has_token("Connection", "close") {
            false
        } else if self.headers.has_token("Connection", "keep-alive") {
            true
        } else {
            self.version.keep_alive_by_default()
        }
    }
}

/// The request line and header section of a request.
pub(crate) struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: HttpVersion,
    pub headers: Headers,
}

impl RequestHead {
    /// Body length announced by the headers.
    pub fn content_length(&self) -> Result<usize, Error> {
        if let Some(coding) = self.headers.get("Transfer-Encoding") {
            return Err(Error::UnsupportedTransferEncoding(coding.to_string()));
        }
        match self.headers.get("Content-Length") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::InvalidContentLength(value.to_string())),
            None => Ok(0),
        }
    }

    pub fn into_request(self, body: Vec<u8>) -> HttpRequest {
        HttpRequest::with_body(self.method, &self.target, self.version, self.headers, body)
    }
}

/// The request line must be UTF-8; the target is percent-encoded ASCII in practice.
pub(crate) fn decode_request_line(bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|_| Error::MalformedRequestLine(String::from_utf8_lossy(bytes).into_owned()))
}

/// Header lines are decoded as ISO-8859-1, so obs-text bytes in values survive.
pub(crate) fn decode_header_line(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse `METHOD TARGET VERSION`.
pub(crate) fn parse_request_line(line: &str) -> Result<(Method, String, HttpVersion), Error> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(line.to_string()));
    }

    let method = Method::from_str(parts[0])?;
    let target = normalize_target(parts[1])?;
    let version = HttpVersion::from_str(parts[2])?;

    Ok((method, target, version))
}

// Reduce absolute-form targets to origin-form; keep `*` for OPTIONS.
fn normalize_target(target: &str) -> Result<String, Error> {
    if target.starts_with('/') || target == "*" {
        return Ok(target.to_string());
    }
    if target.starts_with("http://") || target.starts_with("https://") {
        let url = url::Url::parse(target).map_err(|_| Error::InvalidPath)?;
        return Ok(match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        });
    }
    Err(Error::InvalidPath)
}

/// Parse a single `Name: Value` header line into `headers`.
pub(crate) fn parse_header_line(line: &str, headers: &mut Headers) -> Result<(), Error> {
    // obs-fold is rejected
    if line.starts_with(' ') || line.starts_with('\t') {
        return Err(Error::InvalidHeaderFormat(line.to_string()));
    }
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::InvalidHeaderFormat(line.to_string()))?;
    if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace()) {
        return Err(Error::InvalidHeaderFormat(line.to_string()));
    }
    headers.insert(name, value.trim_matches([' ', '\t']));
    Ok(())
}

/// Parse a complete HTTP request from a byte slice.
///
/// The slice must hold the whole header section and at least
/// `Content-Length` bytes of body; bytes past the body are ignored.
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    let head_end = find_head_end(input);

    let (head_bytes, rest) = match head_end {
        Some((head, body_start)) => (&input[..head], &input[body_start..]),
        None if input.iter().all(|b| b.is_ascii_whitespace()) => return Err(Error::ConnectionClosed),
        None => return Err(Error::Incomplete),
    };

    let mut lines = head_bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .skip_while(|line| line.is_empty());

    let request_line = lines.next().ok_or(Error::ConnectionClosed)?;
    let (method, target, version) = parse_request_line(decode_request_line(request_line)?)?;

    let mut headers = Headers::new();
    for line in lines {
        parse_header_line(&decode_header_line(line), &mut headers)?;
    }

    let head = RequestHead { method, target, version, headers };
    let length = head.content_length()?;
    if rest.len() < length {
        return Err(Error::Incomplete);
    }
    let body = rest[..length].to_vec();
    Ok(head.into_request(body))
}

// Locate the blank line ending the header section. Returns the end of the
// last header line and the start of the body.
fn find_head_end(input: &[u8]) -> Option<(usize, usize)> {
    input.iter().enumerate().find_map(|(i, &b)| {
        if b != b'\n' {
            return None;
        }
        match &input[i + 1..] {
            [b'\n', ..] => Some((i, i + 2)),
            [b'\r', b'\n', ..] => Some((i, i + 3)),
            _ => None,
        }
    })
}
