#![cfg(feature = "net")]

use featuregates::net::read_request;
use rustls::{ServerConfig, ServerConnection, Stream};
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    ContentLength,
    Chunked,
}

#[derive(Clone)]
struct Route {
    status: u16,
    body: String,
}

/// Request as seen by the fake server.
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

/// Minimal TLS API server answering canned JSON per path; unknown paths get
/// a Kubernetes-style 404 `Status` object.
pub struct FakeApiServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    shutdown: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl FakeApiServer {
    pub fn spawn(tls: Arc<ServerConfig>, framing: Framing) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let routes = Arc::new(Mutex::new(HashMap::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let join = {
            let routes = routes.clone();
            let seen = seen.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            let _ = serve(stream, tls.clone(), framing, &routes, &seen);
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(10));
                        }
                        Err(_) => break,
                    }
                }
            })
        };
        Ok(Self {
            addr,
            routes,
            seen,
            shutdown,
            join: Some(join),
        })
    }

    pub fn base_url(&self) -> String {
        format!("https://127.0.0.1:{}/", self.addr.port())
    }

    pub fn route(&self, path: &str, status: u16, body: impl Into<String>) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            Route {
                status,
                body: body.into(),
            },
        );
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for FakeApiServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn serve(
    mut stream: TcpStream,
    tls: Arc<ServerConfig>,
    framing: Framing,
    routes: &Mutex<HashMap<String, Route>>,
    seen: &Mutex<Vec<SeenRequest>>,
) -> Result<(), Box<dyn std::error::Error>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut conn = ServerConnection::new(tls)?;
    let mut tls_io = Stream::new(&mut conn, &mut stream);
    let request = read_request(&mut tls_io)?;
    seen.lock().unwrap().push(SeenRequest {
        method: request.method.clone(),
        path: request.path.clone(),
        authorization: request.header("Authorization").map(str::to_string),
    });
    let route = routes
        .lock()
        .unwrap()
        .get(&request.path)
        .cloned()
        .unwrap_or_else(|| Route {
            status: 404,
            body: r#"{"kind":"Status","apiVersion":"v1","status":"Failure","reason":"NotFound","code":404}"#
                .to_string(),
        });
    let reason = match route.status {
        200 => "OK",
        404 => "Not Found",
        _ => "Error",
    };
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nConnection: close\r\n",
        route.status, reason
    );
    match framing {
        Framing::ContentLength => {
            response.push_str(&format!("Content-Length: {}\r\n\r\n", route.body.len()));
            response.push_str(&route.body);
        }
        Framing::Chunked => {
            response.push_str("Transfer-Encoding: chunked\r\n\r\n");
            for chunk in route.body.as_bytes().chunks(7) {
                response.push_str(&format!("{:x}\r\n", chunk.len()));
                response.push_str(std::str::from_utf8(chunk)?);
                response.push_str("\r\n");
            }
            response.push_str("0\r\n\r\n");
        }
    }
    tls_io.write_all(response.as_bytes())?;
    tls_io.flush()?;
    conn.send_close_notify();
    conn.complete_io(&mut stream)?;
    Ok(())
}

pub fn pod_json(namespace: &str, name: &str, volume: &str, config_map: &str) -> String {
    serde_json::json!({
        "kind": "Pod",
        "apiVersion": "v1",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "5b1f0c36-3a0e-4b8e-9d7e-6f3c2f7d8e11",
            "labels": {"app": "antrea", "component": "antrea-controller"}
        },
        "spec": {
            "serviceAccountName": "antrea-controller",
            "nodeSelector": {"kubernetes.io/os": "linux"},
            "volumes": [
                {"name": volume, "configMap": {"name": config_map, "defaultMode": 420}},
                {"name": "kube-api-access", "projected": {"sources": []}}
            ]
        },
        "status": {"phase": "Running"}
    })
    .to_string()
}

pub fn config_map_json(namespace: &str, name: &str, controller_conf: &str) -> String {
    serde_json::json!({
        "kind": "ConfigMap",
        "apiVersion": "v1",
        "metadata": {"name": name, "namespace": namespace},
        "data": {
            "antrea-agent.conf": "#configmap-value",
            "antrea-controller.conf": controller_conf
        }
    })
    .to_string()
}
