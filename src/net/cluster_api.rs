#![cfg(feature = "net")]

use crate::discovery::{ClusterApi, ClusterApiError, ConfigMap, ObjectKind, Pod};
use crate::net::http::{find_header_terminator, RequestDeadline};
use crate::net::tls::{
    complete_client_handshake, load_trust_store_from_pem, server_name, TlsTrustStore,
};
use crate::net::{HttpError, NetError};
use crate::timeouts::CLUSTER_API_TIMEOUT;
use httparse::Status;
use log::debug;
use rustls::client::{ClientConfig, ClientConnection, ServerName};
use rustls::Stream;
use serde::de::DeserializeOwned;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

pub const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
pub const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const MAX_RESPONSE_HEADER_BYTES: usize = 64 * 1024;
const MAX_RESPONSE_BODY_BYTES: usize = 4 * 1024 * 1024;
const MAX_CHUNK_LINE_BYTES: usize = 1024;

pub struct HttpClusterApiBuilder {
    base_url: Url,
    trust_store: Option<TlsTrustStore>,
    bearer_token: Option<String>,
    socket_timeout: Duration,
}

/// Blocking HTTPS client for the core/v1 endpoints self-discovery reads.
///
/// Every call opens a fresh connection and is attempted exactly once.
pub struct HttpClusterApi {
    authority: String,
    host: String,
    port: u16,
    base: Url,
    tls_config: Arc<ClientConfig>,
    server_name: ServerName,
    bearer_token: Option<String>,
    socket_timeout: Duration,
}

impl HttpClusterApiBuilder {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, NetError> {
        let url = Url::parse(base_url.as_ref())?;
        if url.scheme() != "https" {
            return Err(NetError::from(HttpError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            }));
        }
        Ok(Self {
            base_url: ensure_trailing_slash(url),
            trust_store: None,
            bearer_token: None,
            socket_timeout: CLUSTER_API_TIMEOUT,
        })
    }

    /// Builder preloaded from the service-account mount and service env of
    /// the pod this process runs in.
    pub fn in_cluster() -> Result<Self, NetError> {
        Self::in_cluster_with(
            |name| std::env::var(name).ok(),
            Path::new(SERVICE_ACCOUNT_DIR),
        )
    }

    pub fn in_cluster_with<F>(lookup: F, account_dir: &Path) -> Result<Self, NetError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(SERVICE_HOST_ENV)
            .filter(|value| !value.is_empty())
            .ok_or(HttpError::MissingHost)?;
        let port = lookup(SERVICE_PORT_ENV)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "443".to_string());
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };
        let trust = load_trust_store_from_pem(account_dir.join("ca.crt"))?;
        Ok(Self::new(format!("https://{host}:{port}/"))?
            .trust_store(trust)
            .bearer_token_file(account_dir.join("token"))?)
    }

    pub fn trust_store(mut self, trust: TlsTrustStore) -> Self {
        self.trust_store = Some(trust);
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = (!token.trim().is_empty()).then(|| token.trim().to_string());
        self
    }

    pub fn bearer_token_file(self, path: impl Into<PathBuf>) -> Result<Self, NetError> {
        let token = std::fs::read_to_string(path.into())?;
        Ok(self.bearer_token(token))
    }

    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn build(self) -> Result<HttpClusterApi, NetError> {
        let trust = self.trust_store.ok_or(HttpError::MissingTrustStore)?;
        let host = match self.base_url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(NetError::from(HttpError::MissingHost)),
        };
        let port = self.base_url.port_or_known_default().unwrap_or(443);
        let host_str = self.base_url.host_str().unwrap_or(host.as_str()).to_string();
        let authority = if port == 443 {
            host_str
        } else {
            format!("{host_str}:{port}")
        };
        Ok(HttpClusterApi {
            authority,
            server_name: server_name(&host)?,
            host,
            port,
            base: self.base_url,
            tls_config: trust.client_config(),
            bearer_token: self.bearer_token,
            socket_timeout: self.socket_timeout,
        })
    }
}

impl HttpClusterApi {
    pub fn builder(base_url: impl AsRef<str>) -> Result<HttpClusterApiBuilder, NetError> {
        HttpClusterApiBuilder::new(base_url)
    }

    pub fn in_cluster() -> Result<Self, NetError> {
        HttpClusterApiBuilder::in_cluster()?.build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn fetch_object<T: DeserializeOwned>(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<T, ClusterApiError> {
        let path = object_path(kind, namespace, name);
        let (status, body) = self.execute_get(&path).map_err(|err| {
            debug!(
                "event=cluster_api_request_failed kind={} namespace={} name={} error={err}",
                kind, namespace, name
            );
            ClusterApiError::Transport {
                details: err.to_string(),
            }
        })?;
        match status {
            200 => serde_json::from_slice(&body).map_err(|err| ClusterApiError::Decode {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
                details: err.to_string(),
            }),
            404 => Err(ClusterApiError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            status => Err(ClusterApiError::Transport {
                details: HttpError::UnexpectedStatus { status }.to_string(),
            }),
        }
    }

    fn execute_get(&self, path: &str) -> Result<(u16, Vec<u8>), NetError> {
        let target = self.build_url(path)?;
        let deadline = RequestDeadline::from_timeout(self.socket_timeout);
        let mut stream = self.connect(&deadline)?;
        let mut conn = ClientConnection::new(self.tls_config.clone(), self.server_name.clone())?;
        complete_client_handshake(&mut conn, &mut stream)?;
        let mut request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nAccept: application/json\r\nUser-Agent: antrea-featuregates\r\nConnection: close\r\n",
            target, self.authority
        );
        if let Some(token) = &self.bearer_token {
            request.push_str("Authorization: Bearer ");
            request.push_str(token);
            request.push_str("\r\n");
        }
        request.push_str("\r\n");
        deadline.enforce()?;
        let mut tls = Stream::new(&mut conn, &mut stream);
        tls.write_all(request.as_bytes()).map_err(map_io_error)?;
        tls.flush().map_err(map_io_error)?;
        deadline.enforce()?;
        read_http_response(&mut tls)
    }

    fn connect(&self, deadline: &RequestDeadline) -> Result<TcpStream, NetError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(NetError::Io)?
            .collect();
        let mut last_err = None;
        for addr in addrs {
            let timeout = deadline.budget()?;
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    let remaining = deadline.budget()?;
                    stream.set_read_timeout(Some(remaining))?;
                    stream.set_write_timeout(Some(remaining))?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(NetError::Io(last_err.unwrap_or_else(|| {
            io::Error::other("no cluster API addresses resolved")
        })))
    }

    fn build_url(&self, path: &str) -> Result<String, NetError> {
        let trimmed = path.trim_start_matches('/');
        let relative = if trimmed.is_empty() { "." } else { trimmed };
        let resolved = self
            .base
            .join(relative)
            .map_err(HttpError::InvalidEndpointPath)?;
        if resolved.host_str() != self.base.host_str() {
            return Err(NetError::from(HttpError::HostMismatch));
        }
        let mut result = resolved.path().to_string();
        if result.is_empty() {
            result.push('/');
        }
        if let Some(query) = resolved.query() {
            result.push('?');
            result.push_str(query);
        }
        Ok(result)
    }
}

impl ClusterApi for HttpClusterApi {
    fn fetch_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterApiError> {
        self.fetch_object(ObjectKind::Pod, namespace, name)
    }

    fn fetch_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterApiError> {
        self.fetch_object(ObjectKind::ConfigMap, namespace, name)
    }
}

fn object_path(kind: ObjectKind, namespace: &str, name: &str) -> String {
    format!(
        "api/v1/namespaces/{}/{}/{}",
        encode_segment(namespace),
        kind.resource(),
        encode_segment(name)
    )
}

// Object names are DNS subdomains in practice; anything else is escaped so a
// name cannot add path segments.
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Buffered view over a response stream; bytes read past the headers stay
/// available to the body decoder.
struct ResponseBuffer<'a, R: Read> {
    stream: &'a mut R,
    buffer: Vec<u8>,
    scratch: [u8; 4096],
}

impl<'a, R: Read> ResponseBuffer<'a, R> {
    fn new(stream: &'a mut R) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            scratch: [0u8; 4096],
        }
    }

    fn fill(&mut self) -> Result<usize, NetError> {
        match self.stream.read(&mut self.scratch) {
            Ok(read) => {
                self.buffer.extend_from_slice(&self.scratch[..read]);
                Ok(read)
            }
            // Servers that close without a TLS close_notify end the body here.
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            Err(err) => Err(map_io_error(err)),
        }
    }

    fn take(&mut self, len: usize) -> Result<Vec<u8>, NetError> {
        while self.buffer.len() < len {
            if self.fill()? == 0 {
                return Err(NetError::from(HttpError::TruncatedBody));
            }
        }
        let rest = self.buffer.split_off(len);
        Ok(std::mem::replace(&mut self.buffer, rest))
    }

    fn take_line(&mut self) -> Result<Vec<u8>, NetError> {
        loop {
            if let Some(pos) = self.buffer.windows(2).position(|window| window == b"\r\n") {
                let mut line = self.take(pos + 2)?;
                line.truncate(pos);
                return Ok(line);
            }
            if self.buffer.len() > MAX_CHUNK_LINE_BYTES {
                return Err(NetError::from(HttpError::InvalidChunk));
            }
            if self.fill()? == 0 {
                return Err(NetError::from(HttpError::TruncatedBody));
            }
        }
    }

    fn take_to_end(&mut self) -> Result<Vec<u8>, NetError> {
        while self.fill()? > 0 {
            if self.buffer.len() > MAX_RESPONSE_BODY_BYTES {
                return Err(NetError::from(HttpError::BodyTooLarge));
            }
        }
        Ok(std::mem::take(&mut self.buffer))
    }
}

enum BodyFraming {
    Length(usize),
    Chunked,
    UntilClose,
}

/// Reads one HTTP/1.1 response. Bodies framed by `Content-Length`, chunked
/// transfer coding, or connection close are supported.
fn read_http_response(stream: &mut impl Read) -> Result<(u16, Vec<u8>), NetError> {
    let mut reader = ResponseBuffer::new(stream);
    let header_len = loop {
        if let Some(pos) = find_header_terminator(&reader.buffer) {
            break pos + 4;
        }
        if reader.buffer.len() > MAX_RESPONSE_HEADER_BYTES {
            return Err(NetError::from(HttpError::HeadersTooLarge));
        }
        if reader.fill()? == 0 {
            return Err(NetError::from(HttpError::ResponseParse));
        }
    };
    let head = reader.take(header_len)?;
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(&head) {
        Ok(Status::Complete(_)) => {}
        _ => return Err(NetError::from(HttpError::ResponseParse)),
    }
    let status = response
        .code
        .ok_or_else(|| NetError::from(HttpError::MissingStatusCode))?;
    let mut framing = BodyFraming::UntilClose;
    for header in response.headers.iter() {
        if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
            let value = std::str::from_utf8(header.value).unwrap_or_default();
            if value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
            {
                framing = BodyFraming::Chunked;
                break;
            }
        } else if header.name.eq_ignore_ascii_case("Content-Length") {
            let value = std::str::from_utf8(header.value)
                .map_err(|_| NetError::from(HttpError::InvalidContentLengthHeader))?;
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|_| NetError::from(HttpError::InvalidContentLengthValue))?;
            framing = BodyFraming::Length(len);
        }
    }
    let body = match framing {
        BodyFraming::Length(len) => {
            if len > MAX_RESPONSE_BODY_BYTES {
                return Err(NetError::from(HttpError::BodyTooLarge));
            }
            reader.take(len)?
        }
        BodyFraming::Chunked => read_chunked_body(&mut reader)?,
        BodyFraming::UntilClose => reader.take_to_end()?,
    };
    Ok((status, body))
}

fn read_chunked_body<R: Read>(reader: &mut ResponseBuffer<'_, R>) -> Result<Vec<u8>, NetError> {
    let mut body = Vec::new();
    loop {
        let line = reader.take_line()?;
        let line = std::str::from_utf8(&line).map_err(|_| HttpError::InvalidChunk)?;
        let size_field = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_field, 16).map_err(|_| HttpError::InvalidChunk)?;
        if size == 0 {
            // Trailer section ends with an empty line.
            while !reader.take_line()?.is_empty() {}
            return Ok(body);
        }
        if size > MAX_RESPONSE_BODY_BYTES.saturating_sub(body.len()) {
            return Err(NetError::from(HttpError::BodyTooLarge));
        }
        body.extend_from_slice(&reader.take(size)?);
        if reader.take(2)? != b"\r\n" {
            return Err(NetError::from(HttpError::InvalidChunk));
        }
    }
}

fn map_io_error(err: io::Error) -> NetError {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    ) {
        NetError::from(HttpError::RequestTimeout)
    } else {
        NetError::from(err)
    }
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
