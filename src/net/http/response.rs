#![cfg(feature = "net")]

use super::parser::is_timeout;
use crate::net::{HttpError, NetError};
use serde::Serialize;
use serde_json::json;
use std::io::Write;

/// Serializes `payload` and writes it as a complete `Connection: close`
/// response.
pub(crate) fn write_json_response<T: Serialize>(
    stream: &mut (impl Write + ?Sized),
    status: u16,
    payload: &T,
) -> Result<(), NetError> {
    let body = serde_json::to_vec(payload).map_err(HttpError::JsonSerialize)?;
    let mut message = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        reason_phrase(status),
        body.len()
    )
    .into_bytes();
    message.extend_from_slice(&body);
    stream
        .write_all(&message)
        .and_then(|()| stream.flush())
        .map_err(|err| {
            if is_timeout(&err) {
                NetError::from(HttpError::ResponseTimeout)
            } else {
                NetError::from(err)
            }
        })
}

pub(crate) fn write_timeout_response(stream: &mut (impl Write + ?Sized)) -> Result<(), NetError> {
    write_json_response(
        stream,
        408,
        &json!({"error": "request deadline exceeded", "status": 408}),
    )
}

pub(crate) fn find_header_terminator(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
