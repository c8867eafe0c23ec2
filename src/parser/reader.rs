//! Reading requests off a live byte stream.

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::parser::error::Error;
use crate::parser::headers::Headers;
use crate::parser::request::{
    decode_header_line, decode_request_line, parse_header_line, parse_request_line, HttpRequest, RequestHead,
};

/// Size limits applied while reading a request.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ParseLimits {
    /// Longest accepted request line or header line, excluding the line ending.
    pub max_line_bytes: usize,
    /// Most header lines accepted in one request.
    pub max_headers: usize,
    /// Largest accepted Content-Length.
    pub max_body_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 8190,
            max_headers: 100,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

// Leading blank lines tolerated before a request line.
const MAX_LEADING_EMPTY_LINES: usize = 4;

enum Line {
    Eof,
    Text(Vec<u8>),
}

/// Read one line, without its `\r\n` or `\n` terminator.
///
/// EOF before any byte yields `Line::Eof`; EOF in the middle of a line is
/// `Error::Incomplete`.
async fn read_line<R>(reader: &mut R, limit: usize) -> Result<Line, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    // One byte of slack for `\r` and one for `\n`.
    let max = (limit as u64).saturating_add(2);
    let n = (&mut *reader).take(max).read_until(b'\n', &mut buf).await?;

    if n == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() != Some(&b'\n') {
        return Err(if buf.len() as u64 >= max {
            Error::TooLarge("line exceeds limit")
        } else {
            Error::Incomplete
        });
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > limit {
        return Err(Error::TooLarge("line exceeds limit"));
    }

    Ok(Line::Text(buf))
}

/// Read one complete request from `reader`.
///
/// Returns `Error::ConnectionClosed` when the stream ends before a request
/// starts, and `Error::Incomplete` when it ends part way through one.
pub async fn read_request<R>(reader: &mut R, limits: &ParseLimits) -> Result<HttpRequest, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut empty_lines = 0;
    let request_line = loop {
        match read_line(reader, limits.max_line_bytes).await? {
            Line::Eof => return Err(Error::ConnectionClosed),
            Line::Text(line) if line.is_empty() => {
                empty_lines += 1;
                if empty_lines > MAX_LEADING_EMPTY_LINES {
                    return Err(Error::MalformedRequestLine(String::new()));
                }
            }
            Line::Text(line) => break line,
        }
    };

    let (method, target, version) = parse_request_line(decode_request_line(&request_line)?)?;

    let mut headers = Headers::new();
    let mut count = 0;
    loop {
        let line = match read_line(reader, limits.max_line_bytes).await? {
            Line::Eof => return Err(Error::Incomplete),
            Line::Text(line) => line,
        };
        if line.is_empty() {
            break;
        }
        count += 1;
        if count > limits.max_headers {
            return Err(Error::TooLarge("too many headers"));
        }
        parse_header_line(&decode_header_line(&line), &mut headers)?;
    }

    let head = RequestHead { method, target, version, headers };
    let length = head.content_length()?;
    if length > limits.max_body_bytes {
        return Err(Error::TooLarge("body exceeds limit"));
    }

    let mut body = vec![0; length];
    if length > 0 {
        reader.read_exact(&mut body).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Incomplete,
            _ => Error::Io(e),
        })?;
    }

    Ok(head.into_request(body))
}
