#![cfg(feature = "net")]

use super::apiserver_support::{config_map_json, pod_json, FakeApiServer, Framing};
use super::http_client::http_request;
use super::tls_support::generate_api_server_tls;
use featuregates::discovery::DiscoveryEnv;
use featuregates::net::{
    FeatureGatesHttpServer, FeatureGatesHttpServerConfig, FeatureGatesHttpServerHandle,
    HttpClusterApiBuilder,
};
use featuregates::{ComponentRole, FeatureGateRegistry, FeatureGatesHandler, Platform};
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const POD: &str = "antrea-controller-wotqiwth";
const CONFIG_MAP: &str = "antrea-config-aswieut";

struct Fixture {
    _temp: TempDir,
    api_server: FakeApiServer,
    handle: FeatureGatesHttpServerHandle,
}

fn start(controller_conf: Option<&str>) -> Result<Fixture, Box<dyn Error>> {
    let temp = TempDir::new()?;
    let tls = generate_api_server_tls(&temp)?;
    let api_server = FakeApiServer::spawn(tls.server_config.clone(), Framing::Chunked)?;
    if let Some(conf) = controller_conf {
        api_server.route(
            &format!("/api/v1/namespaces/kube-system/pods/{POD}"),
            200,
            pod_json("kube-system", POD, "antrea-config", CONFIG_MAP),
        );
        api_server.route(
            &format!("/api/v1/namespaces/kube-system/configmaps/{CONFIG_MAP}"),
            200,
            config_map_json("kube-system", CONFIG_MAP, conf),
        );
    }
    let api = HttpClusterApiBuilder::new(api_server.base_url())?
        .trust_store(tls.trust.clone())
        .bearer_token("sa-token")
        .build()?;
    let handler = FeatureGatesHandler::new(
        Arc::new(FeatureGateRegistry::antrea_for(Platform::Linux)),
        Arc::new(api),
        DiscoveryEnv::new(POD, CONFIG_MAP),
    );
    let handle = FeatureGatesHttpServer::spawn(
        FeatureGatesHttpServerConfig::new("127.0.0.1:0".parse()?),
        Arc::new(handler),
    )?;
    Ok(Fixture {
        _temp: temp,
        api_server,
        handle,
    })
}

#[test]
fn serves_controller_report_from_cluster_config() -> Result<(), Box<dyn Error>> {
    let mut fixture = start(Some("featureGates:\n  Traceflow: false\n  NotAGate: true\n"))?;
    let addr = fixture.handle.local_addr();
    assert_ne!(addr.port(), 0);

    let response = http_request(addr, "GET", "/featuregates")?;
    assert_eq!(response.status, 200);
    let body: Value = response.json()?;
    let entries = body.as_array().expect("array");
    assert_eq!(entries.len(), 13);
    let names: Vec<&str> = entries
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    let traceflow = entries
        .iter()
        .find(|entry| entry["name"] == "Traceflow")
        .expect("Traceflow");
    assert_eq!(
        traceflow,
        &serde_json::json!({"component": "controller", "name": "Traceflow", "status": "Disabled", "version": "BETA"})
    );
    assert!(entries.iter().all(|entry| entry["component"] == "controller"));

    // Every request re-reads the configuration.
    http_request(addr, "GET", "/featuregates")?;
    assert_eq!(fixture.api_server.seen().len(), 4);

    fixture.handle.try_shutdown(Duration::from_secs(2))?;
    Ok(())
}

#[test]
fn flat_override_wins_and_other_gates_keep_defaults() -> Result<(), Box<dyn Error>> {
    let mut fixture = start(Some("AntreaPolicy=false"))?;
    let response = http_request(fixture.handle.local_addr(), "GET", "/featuregates")?;
    assert_eq!(response.status, 200);
    let body: Value = response.json()?;
    let entries = body.as_array().expect("array");

    let registry = FeatureGateRegistry::antrea_for(Platform::Linux);
    assert_eq!(entries.len(), registry.lookup(ComponentRole::Controller).len());
    for entry in entries {
        let name = entry["name"].as_str().expect("name");
        let gate = registry.get(name).expect("gate is registered");
        let enabled = if name == "AntreaPolicy" {
            false
        } else {
            gate.default_enabled(Platform::Linux)
        };
        let expected_status = if enabled { "Enabled" } else { "Disabled" };
        assert_eq!(entry["status"], expected_status, "{name}");
        assert_eq!(entry["component"], "controller", "{name}");
        assert_eq!(
            entry.get("version").and_then(Value::as_str),
            gate.maturity().label(),
            "{name}"
        );
    }
    assert!(entries
        .iter()
        .any(|entry| entry["name"] == "AntreaPolicy" && entry["status"] == "Disabled"));

    fixture.handle.try_shutdown(Duration::from_secs(2))?;
    Ok(())
}

#[test]
fn zero_request_timeout_still_answers() -> Result<(), Box<dyn Error>> {
    let handler = FeatureGatesHandler::new(
        Arc::new(FeatureGateRegistry::antrea_for(Platform::Linux)),
        Arc::new(featuregates::InMemoryClusterApi::unreachable("connection refused")),
        DiscoveryEnv::new(POD, CONFIG_MAP),
    );
    let mut config = FeatureGatesHttpServerConfig::new("127.0.0.1:0".parse()?);
    config.request_timeout = Duration::ZERO;
    let mut handle = FeatureGatesHttpServer::spawn(config, Arc::new(handler))?;
    let response = http_request(handle.local_addr(), "GET", "/featuregates")?;
    assert_eq!(response.status, 500);
    handle.try_shutdown(Duration::from_secs(2))?;
    Ok(())
}

#[test]
fn discovery_failure_returns_500_without_report() -> Result<(), Box<dyn Error>> {
    let mut fixture = start(None)?;
    let response = http_request(fixture.handle.local_addr(), "GET", "/featuregates")?;
    assert_eq!(response.status, 500);
    let body: Value = response.json()?;
    assert_eq!(body["status"], 500);
    assert!(body["error"]
        .as_str()
        .expect("error text")
        .contains(POD));
    fixture.handle.try_shutdown(Duration::from_secs(2))?;
    Ok(())
}

#[test]
fn rejects_other_routes_and_methods() -> Result<(), Box<dyn Error>> {
    let mut fixture = start(Some("#configmap-value"))?;
    let addr = fixture.handle.local_addr();
    let response = http_request(addr, "GET", "/healthz")?;
    assert_eq!(response.status, 404);
    let response = http_request(addr, "DELETE", "/featuregates")?;
    assert_eq!(response.status, 405);
    assert_eq!(response.json()?["error"], "method not allowed");
    assert!(fixture.api_server.seen().is_empty());
    fixture.handle.try_shutdown(Duration::from_secs(2))?;
    Ok(())
}

#[cfg(feature = "async-net")]
#[tokio::test(flavor = "multi_thread")]
async fn async_server_serves_and_shuts_down() -> Result<(), Box<dyn Error>> {
    use featuregates::net::AsyncFeatureGatesHttpServer;
    use featuregates::InMemoryClusterApi;

    let handler = FeatureGatesHandler::new(
        Arc::new(FeatureGateRegistry::antrea_for(Platform::Linux)),
        Arc::new(InMemoryClusterApi::unreachable("connection refused")),
        DiscoveryEnv::new(POD, CONFIG_MAP),
    );
    let mut handle = AsyncFeatureGatesHttpServer::spawn(
        FeatureGatesHttpServerConfig::new("127.0.0.1:0".parse()?),
        Arc::new(handler),
    )
    .await?;
    let addr = handle.local_addr();
    let response = tokio::task::spawn_blocking(move || {
        http_request(addr, "GET", "/featuregates").map_err(|err| err.to_string())
    })
    .await??;
    assert_eq!(response.status, 500);
    handle.try_shutdown(Duration::from_secs(2)).await?;
    Ok(())
}
