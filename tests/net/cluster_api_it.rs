#![cfg(feature = "net")]

use super::apiserver_support::{config_map_json, pod_json, FakeApiServer, Framing};
use super::tls_support::{generate_api_server_tls, generate_foreign_trust};
use featuregates::discovery::{ClusterApi, ClusterApiError, ObjectKind};
use featuregates::net::{HttpClusterApi, HttpClusterApiBuilder};
use std::error::Error;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const POD_PATH: &str = "/api/v1/namespaces/kube-system/pods/antrea-controller-wotqiwth";
const CONFIG_MAP_PATH: &str = "/api/v1/namespaces/kube-system/configmaps/antrea-config-aswieut";

fn client(server: &FakeApiServer, tls: &super::tls_support::ApiServerTls) -> HttpClusterApi {
    HttpClusterApiBuilder::new(server.base_url())
        .expect("builder")
        .trust_store(tls.trust.clone())
        .bearer_token("sa-token-123\n")
        .socket_timeout(Duration::from_secs(5))
        .build()
        .expect("client")
}

#[test]
fn decodes_pod_and_config_map() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let tls = generate_api_server_tls(&temp)?;
    let server = FakeApiServer::spawn(tls.server_config.clone(), Framing::ContentLength)?;
    server.route(
        POD_PATH,
        200,
        pod_json(
            "kube-system",
            "antrea-controller-wotqiwth",
            "antrea-config",
            "antrea-config-aswieut",
        ),
    );
    server.route(
        CONFIG_MAP_PATH,
        200,
        config_map_json(
            "kube-system",
            "antrea-config-aswieut",
            "featureGates:\n  Traceflow: false\n",
        ),
    );
    let api = client(&server, &tls);

    let pod = api.fetch_pod("kube-system", "antrea-controller-wotqiwth")?;
    assert_eq!(pod.metadata.name, "antrea-controller-wotqiwth");
    let volume = pod
        .config_map_volume("antrea-config-aswieut")
        .expect("config map volume");
    assert_eq!(volume.name, "antrea-config");

    let config_map = api.fetch_config_map("kube-system", "antrea-config-aswieut")?;
    assert_eq!(
        config_map.entry("antrea-controller.conf"),
        Some("featureGates:\n  Traceflow: false\n")
    );

    let seen = server.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].path, POD_PATH);
    assert_eq!(seen[1].path, CONFIG_MAP_PATH);
    assert!(seen
        .iter()
        .all(|request| request.authorization.as_deref() == Some("Bearer sa-token-123")));
    Ok(())
}

#[test]
fn decodes_chunked_responses() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let tls = generate_api_server_tls(&temp)?;
    let server = FakeApiServer::spawn(tls.server_config.clone(), Framing::Chunked)?;
    server.route(
        CONFIG_MAP_PATH,
        200,
        config_map_json("kube-system", "antrea-config-aswieut", "#configmap-value"),
    );
    let config_map = client(&server, &tls).fetch_config_map("kube-system", "antrea-config-aswieut")?;
    assert_eq!(config_map.entry("antrea-agent.conf"), Some("#configmap-value"));
    Ok(())
}

#[test]
fn missing_objects_map_to_not_found() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let tls = generate_api_server_tls(&temp)?;
    let server = FakeApiServer::spawn(tls.server_config.clone(), Framing::ContentLength)?;
    match client(&server, &tls).fetch_pod("kube-system", "antrea-agent-gone") {
        Err(ClusterApiError::NotFound {
            kind,
            namespace,
            name,
        }) => {
            assert_eq!(kind, ObjectKind::Pod);
            assert_eq!(namespace, "kube-system");
            assert_eq!(name, "antrea-agent-gone");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn server_errors_and_bad_bodies_are_not_retried() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let tls = generate_api_server_tls(&temp)?;
    let server = FakeApiServer::spawn(tls.server_config.clone(), Framing::ContentLength)?;
    server.route(POD_PATH, 503, r#"{"kind":"Status","code":503}"#);
    server.route(CONFIG_MAP_PATH, 200, "not json");
    let api = client(&server, &tls);

    let err = api
        .fetch_pod("kube-system", "antrea-controller-wotqiwth")
        .expect_err("503");
    assert!(matches!(err, ClusterApiError::Transport { .. }));
    assert!(err.to_string().contains("503"));

    let err = api
        .fetch_config_map("kube-system", "antrea-config-aswieut")
        .expect_err("bad body");
    assert!(matches!(err, ClusterApiError::Decode { .. }));
    assert_eq!(server.seen().len(), 2, "each call is attempted once");
    Ok(())
}

#[test]
fn untrusted_server_certificate_is_a_transport_error() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let tls = generate_api_server_tls(&temp)?;
    let server = FakeApiServer::spawn(tls.server_config.clone(), Framing::ContentLength)?;
    let api = HttpClusterApiBuilder::new(server.base_url())?
        .trust_store(generate_foreign_trust(&temp)?)
        .build()?;
    let err = api
        .fetch_pod("kube-system", "antrea-controller-wotqiwth")
        .expect_err("untrusted");
    assert!(matches!(err, ClusterApiError::Transport { .. }));
    Ok(())
}

#[test]
fn in_cluster_reads_service_account_mount() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let tls = generate_api_server_tls(&temp)?;
    let server = FakeApiServer::spawn(tls.server_config.clone(), Framing::ContentLength)?;
    server.route(
        POD_PATH,
        200,
        pod_json(
            "kube-system",
            "antrea-controller-wotqiwth",
            "antrea-config",
            "antrea-config-aswieut",
        ),
    );
    let account = TempDir::new()?;
    fs::copy(&tls.ca_path, account.path().join("ca.crt"))?;
    fs::write(account.path().join("token"), "mounted-token\n")?;
    let port = server
        .base_url()
        .trim_end_matches('/')
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .to_string();
    let api = HttpClusterApiBuilder::in_cluster_with(
        |name| match name {
            "KUBERNETES_SERVICE_HOST" => Some("127.0.0.1".to_string()),
            "KUBERNETES_SERVICE_PORT" => Some(port.clone()),
            _ => None,
        },
        account.path(),
    )?
    .build()?;
    api.fetch_pod("kube-system", "antrea-controller-wotqiwth")?;
    assert_eq!(
        server.seen()[0].authorization.as_deref(),
        Some("Bearer mounted-token")
    );
    Ok(())
}
