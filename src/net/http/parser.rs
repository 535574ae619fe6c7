#![cfg(feature = "net")]

use super::response::find_header_terminator;
use crate::net::{HttpError, NetError};
use httparse::Status;
use std::io::{self, Read};

const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 32;
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const READ_CHUNK: usize = 1024;

/// Request line, headers and buffered body of one inbound request.
#[derive(Debug, Clone)]
pub struct SimpleHttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SimpleHttpRequest {
    /// Case-insensitive header lookup; the first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

struct RequestHead {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    len: usize,
}

/// Reads one HTTP/1.1 request. Bodies must be framed by `Content-Length`;
/// chunked request bodies are refused.
pub fn read_request(stream: &mut impl Read) -> Result<SimpleHttpRequest, NetError> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let head = loop {
        if let Some(head) = parse_head(&buffer)? {
            break head;
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(HttpError::HeadersTooLarge.into());
        }
        if fill(stream, &mut buffer)? == 0 {
            return Err(HttpError::ConnectionClosedBeforeHeaders.into());
        }
    };
    let (path, query) = match head.target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (head.target.clone(), None),
    };
    let mut request = SimpleHttpRequest {
        method: head.method,
        path,
        query,
        headers: head.headers,
        body: Vec::new(),
    };
    if request
        .header("transfer-encoding")
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    {
        return Err(HttpError::ChunkedRequestBody.into());
    }
    let content_length = match request.header("content-length") {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| HttpError::InvalidContentLengthValue)?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge.into());
    }
    let mut body = buffer.split_off(head.len);
    while body.len() < content_length {
        if fill(stream, &mut body)? == 0 {
            return Err(HttpError::ConnectionClosedBeforeBody.into());
        }
    }
    body.truncate(content_length);
    request.body = body;
    Ok(request)
}

/// Returns `None` until the blank line ending the head has arrived.
fn parse_head(buffer: &[u8]) -> Result<Option<RequestHead>, NetError> {
    let Some(end) = find_header_terminator(buffer) else {
        return Ok(None);
    };
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut slots);
    let len = match parsed.parse(&buffer[..end + 4]) {
        Ok(Status::Complete(len)) => len,
        Ok(Status::Partial) => return Err(HttpError::PartialRequest.into()),
        Err(httparse::Error::TooManyHeaders) => return Err(HttpError::HeadersTooLarge.into()),
        Err(err) => return Err(HttpError::RequestParse(err).into()),
    };
    let method = parsed.method.ok_or(HttpError::MissingMethod)?.to_string();
    let target = parsed.path.ok_or(HttpError::MissingPath)?.to_string();
    let headers = parsed
        .headers
        .iter()
        .map(|header| {
            std::str::from_utf8(header.value)
                .map(|value| (header.name.to_string(), value.to_string()))
                .map_err(|_| HttpError::InvalidHeaderValue {
                    name: header.name.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(RequestHead {
        method,
        target,
        headers,
        len,
    }))
}

fn fill(stream: &mut impl Read, buffer: &mut Vec<u8>) -> Result<usize, NetError> {
    let mut chunk = [0u8; READ_CHUNK];
    let read = stream.read(&mut chunk).map_err(|err| {
        if is_timeout(&err) {
            NetError::from(HttpError::RequestTimeout)
        } else {
            NetError::from(err)
        }
    })?;
    buffer.extend_from_slice(&chunk[..read]);
    Ok(read)
}

pub(super) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
