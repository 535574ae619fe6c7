#![cfg(feature = "net")]

use super::http::{
    read_request, write_json_response, HttpHandlerError, HttpRequestContext, RequestDeadline,
    SimpleHttpRequest,
};
use super::server;
use super::NetError;
use crate::handler::FeatureGatesHandler;
use crate::timeouts::{FEATURE_GATES_REQUEST_TIMEOUT, SERVER_SHUTDOWN_GRACE};
use log::{debug, warn};
use serde_json::json;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "async-net")]
use tokio::task;

pub const FEATURE_GATES_PATH: &str = "/featuregates";

#[derive(Debug, Clone)]
pub struct FeatureGatesHttpServerConfig {
    pub bind: SocketAddr,
    pub max_connections: Option<usize>,
    pub request_timeout: Duration,
}

impl FeatureGatesHttpServerConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            max_connections: None,
            request_timeout: FEATURE_GATES_REQUEST_TIMEOUT,
        }
    }
}

pub struct FeatureGatesHttpServerHandle {
    inner: server::ServerHandle,
}

impl FeatureGatesHttpServerHandle {
    /// Address the listener is bound to; differs from the configured one
    /// when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    pub fn shutdown(&mut self) {
        if let Err(err) = self.try_shutdown(SERVER_SHUTDOWN_GRACE) {
            warn!("event=featuregates_shutdown_error error={err}");
        }
    }

    pub fn try_shutdown(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.inner.try_shutdown(timeout)
    }
}

pub struct FeatureGatesHttpServer;

impl FeatureGatesHttpServer {
    pub fn spawn(
        config: FeatureGatesHttpServerConfig,
        handler: Arc<FeatureGatesHandler>,
    ) -> Result<FeatureGatesHttpServerHandle, NetError> {
        let listener = TcpListener::bind(config.bind)?;
        // Sockets refuse a zero timeout; treat it as unset.
        let request_timeout = if config.request_timeout.is_zero() {
            FEATURE_GATES_REQUEST_TIMEOUT
        } else {
            config.request_timeout
        };
        let connection = move |stream: TcpStream, addr: SocketAddr| -> Result<(), NetError> {
            handle_connection(stream, addr, request_timeout, handler.as_ref())
        };
        let inner = server::spawn_listener(
            "featuregates_http",
            listener,
            config.max_connections,
            connection,
        )
        .map_err(NetError::from)?;
        debug!(
            "event=featuregates_http_listening addr={}",
            inner.local_addr()
        );
        Ok(FeatureGatesHttpServerHandle { inner })
    }
}

fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    request_timeout: Duration,
    handler: &FeatureGatesHandler,
) -> Result<(), NetError> {
    stream.set_read_timeout(Some(request_timeout))?;
    stream.set_write_timeout(Some(request_timeout))?;
    let deadline = RequestDeadline::from_timeout(request_timeout);
    let ctx = HttpRequestContext::new(Some(addr), deadline);
    let result = read_request(&mut stream)
        .map_err(|err| HttpHandlerError::request("request_read", err))
        .and_then(|request| handle_featuregates_request(&ctx, request, handler, &mut stream));
    match result {
        Ok(()) => Ok(()),
        Err(err) => map_featuregates_handler_error(err),
    }
}

pub(crate) fn handle_featuregates_request(
    ctx: &HttpRequestContext,
    request: SimpleHttpRequest,
    handler: &FeatureGatesHandler,
    stream: &mut (impl Write + ?Sized),
) -> Result<(), HttpHandlerError> {
    ctx.check_deadline(stream, "request_read")?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", FEATURE_GATES_PATH) => {
            let report = handler.report();
            ctx.check_deadline(stream, "report_write")?;
            match report {
                Ok(report) => write_json_response(stream, 200, &report)
                    .map_err(|err| HttpHandlerError::response("report_write", err)),
                Err(err) => {
                    warn!(
                        "event=featuregates_report_failed peer={} error={err}",
                        peer_label(ctx)
                    );
                    write_json_response(
                        stream,
                        500,
                        &json!({"error": err.to_string(), "status": 500}),
                    )
                    .map_err(|err| HttpHandlerError::response("report_error_write", err))
                }
            }
        }
        ("GET", _) => {
            debug!(
                "event=featuregates_http_bad_path path={} method={} peer={}",
                request.path,
                request.method,
                peer_label(ctx)
            );
            write_json_response(stream, 404, &json!({"error": "not found", "status": 404}))
                .map_err(|err| HttpHandlerError::response("unknown_route", err))
        }
        _ => write_json_response(
            stream,
            405,
            &json!({"error": "method not allowed", "status": 405}),
        )
        .map_err(|err| HttpHandlerError::response("method_not_allowed", err)),
    }
}

fn peer_label(ctx: &HttpRequestContext) -> String {
    ctx.peer
        .map(|peer| peer.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn map_featuregates_handler_error(err: HttpHandlerError) -> Result<(), NetError> {
    match err {
        HttpHandlerError::DeadlineExpired { stage } => {
            warn!("event=featuregates_http_deadline_expired stage={stage}");
            Ok(())
        }
        HttpHandlerError::Request { stage, error }
        | HttpHandlerError::Response { stage, error } => {
            warn!("event=featuregates_http_handler_error stage={stage} error={error}");
            Err(error)
        }
    }
}

#[cfg(feature = "async-net")]
pub struct AsyncFeatureGatesHttpServerHandle {
    inner: Option<FeatureGatesHttpServerHandle>,
    local_addr: SocketAddr,
}

#[cfg(feature = "async-net")]
impl AsyncFeatureGatesHttpServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(&mut self) {
        if let Err(err) = self.try_shutdown(SERVER_SHUTDOWN_GRACE).await {
            warn!("event=featuregates_async_shutdown_error error={err}");
        }
    }

    pub async fn try_shutdown(&mut self, timeout: Duration) -> Result<(), NetError> {
        if let Some(mut handle) = self.inner.take() {
            task::spawn_blocking(move || handle.try_shutdown(timeout))
                .await
                .map_err(map_join_error)??;
        }
        Ok(())
    }
}

#[cfg(feature = "async-net")]
impl Drop for AsyncFeatureGatesHttpServerHandle {
    fn drop(&mut self) {
        if let Some(mut handle) = self.inner.take() {
            let _ = handle.try_shutdown(SERVER_SHUTDOWN_GRACE);
        }
    }
}

#[cfg(feature = "async-net")]
pub struct AsyncFeatureGatesHttpServer;

#[cfg(feature = "async-net")]
impl AsyncFeatureGatesHttpServer {
    pub async fn spawn(
        config: FeatureGatesHttpServerConfig,
        handler: Arc<FeatureGatesHandler>,
    ) -> Result<AsyncFeatureGatesHttpServerHandle, NetError> {
        let handle = task::spawn_blocking(move || FeatureGatesHttpServer::spawn(config, handler))
            .await
            .map_err(map_join_error)??;
        Ok(AsyncFeatureGatesHttpServerHandle {
            local_addr: handle.local_addr(),
            inner: Some(handle),
        })
    }
}

#[cfg(feature = "async-net")]
fn map_join_error(err: task::JoinError) -> NetError {
    NetError::Io(std::io::Error::other(format!(
        "featuregates async task cancelled: {err}"
    )))
}
