#![cfg(test)]

use std::error::Error;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(&self) -> Result<serde_json::Value, Box<dyn Error>> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Sends one plain HTTP/1.1 request and reads until the server closes.
pub fn http_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
) -> Result<HttpResponse, Box<dyn Error>> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(15)))?;
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nAccept: application/json\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;

    let mut response = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => break,
            Err(err) => return Err(Box::new(err)),
        }
    }
    let (status, payload) = parse_http_response(&response)?;
    Ok(HttpResponse {
        status,
        body: payload.to_vec(),
    })
}

fn parse_http_response(buffer: &[u8]) -> Result<(u16, &[u8]), Box<dyn Error>> {
    let header_end = buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or("response missing header terminator")?;
    let status_line_end = buffer
        .windows(2)
        .position(|window| window == b"\r\n")
        .unwrap_or(header_end);
    let status_line = std::str::from_utf8(&buffer[..status_line_end])?;
    let code = status_line
        .split_whitespace()
        .nth(1)
        .ok_or("missing HTTP status code")?
        .parse::<u16>()?;
    Ok((code, &buffer[header_end + 4..]))
}
