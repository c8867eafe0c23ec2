//! Mapping parsed requests to the context handed to applications.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::net::SocketAddr;

use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::parser::HttpRequest;

/// Standard context keys.
pub mod keys {
    pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
    pub const SCRIPT_NAME: &str = "SCRIPT_NAME";
    pub const PATH_INFO: &str = "PATH_INFO";
    pub const QUERY_STRING: &str = "QUERY_STRING";
    pub const SERVER_PROTOCOL: &str = "SERVER_PROTOCOL";
    pub const SERVER_NAME: &str = "SERVER_NAME";
    pub const SERVER_PORT: &str = "SERVER_PORT";
    pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
    pub const REMOTE_PORT: &str = "REMOTE_PORT";
    pub const CONTENT_TYPE: &str = "CONTENT_TYPE";
    pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";
    pub const URL_SCHEME: &str = "url_scheme";
}

/// Metadata about the connection a request arrived on.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Address of the client.
    pub peer: SocketAddr,
    /// Address the worker accepted the connection on.
    pub local: SocketAddr,
    /// Host name reported as `SERVER_NAME`.
    pub server_name: String,
}

/// The request body as a readable stream.
#[derive(Debug, Default)]
pub struct RequestBody {
    inner: Cursor<Vec<u8>>,
}

impl RequestBody {
    /// Total body length in bytes.
    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Read for RequestBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Everything an application learns about a request.
///
/// Serializes to a flat JSON object of the context variables; the body is
/// not included.
#[derive(Debug, Serialize)]
pub struct RequestContext {
    #[serde(flatten)]
    vars: BTreeMap<String, String>,
    #[serde(skip)]
    input: RequestBody,
}

impl RequestContext {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn method(&self) -> &str {
        self.get(keys::REQUEST_METHOD).unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.get(keys::PATH_INFO).unwrap_or_default()
    }

    pub fn query_string(&self) -> &str {
        self.get(keys::QUERY_STRING).unwrap_or_default()
    }

    /// Look up a request header by its wire name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.get(&header_key(name))
    }

    /// The request body stream.
    pub fn input(&mut self) -> &mut RequestBody {
        &mut self.input
    }
}

/// Context key for a header: `CONTENT_TYPE`, `CONTENT_LENGTH`, or `HTTP_<NAME>`.
pub fn header_key(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    match normalized.as_str() {
        keys::CONTENT_TYPE | keys::CONTENT_LENGTH => normalized,
        _ => format!("HTTP_{normalized}"),
    }
}

/// Build the context for `request` received on the connection described by `info`.
pub fn build_environ(request: HttpRequest, info: &ConnectionInfo) -> RequestContext {
    let mut vars = BTreeMap::new();
    let mut set = |key: &str, value: String| {
        vars.insert(key.to_string(), value);
    };

    set(keys::REQUEST_METHOD, request.method.to_string());
    set(keys::SCRIPT_NAME, String::new());
    set(keys::PATH_INFO, percent_decode_str(&request.path).decode_utf8_lossy().into_owned());
    set(keys::QUERY_STRING, request.query.clone());
    set(keys::SERVER_PROTOCOL, request.version.to_string());
    set(keys::SERVER_NAME, info.server_name.clone());
    set(keys::SERVER_PORT, info.local.port().to_string());
    set(keys::REMOTE_ADDR, info.peer.ip().to_string());
    set(keys::REMOTE_PORT, info.peer.port().to_string());
    set(keys::URL_SCHEME, "http".to_string());

    for (name, value) in request.headers.iter() {
        vars.insert(header_key(name), value.to_string());
    }

    RequestContext {
        vars,
        input: RequestBody {
            inner: Cursor::new(request.body),
        },
    }
}
