#![cfg(feature = "net")]

use super::{CertificateError, NetError};
use rustls::client::ServerName;
use rustls::ClientConnection;
use std::convert::TryFrom;
use std::io::{Read, Write};

pub fn complete_client_handshake<S: Read + Write>(
    conn: &mut ClientConnection,
    stream: &mut S,
) -> Result<(), NetError> {
    while conn.is_handshaking() {
        conn.complete_io(stream)?;
    }
    Ok(())
}

/// Validates `host` as a TLS server name (DNS name or IP literal).
pub fn server_name(host: &str) -> Result<ServerName, NetError> {
    ServerName::try_from(host).map_err(|_| {
        NetError::from(CertificateError::InvalidServerName {
            host: host.to_string(),
        })
    })
}
