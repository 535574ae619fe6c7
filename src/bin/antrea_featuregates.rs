use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use featuregates::config::{load_settings, Settings};
use featuregates::discovery::DiscoveryEnv;
use featuregates::handler::FeatureGatesHandler;
use featuregates::net::{
    load_trust_store_from_pem, AsyncFeatureGatesHttpServer, FeatureGatesHttpServerConfig,
    HttpClusterApi, HttpClusterApiBuilder,
};
use featuregates::registry::FeatureGateRegistry;
use log::{info, warn};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug, Clone)]
#[command(name = "antrea-featuregates", about = "Serves effective Antrea feature gates")]
struct Cli {
    /// Path to the settings YAML
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address for the HTTP endpoint (overrides the settings file)
    #[arg(long)]
    bind: Option<String>,

    /// env_logger-style filter string (e.g. "info,featuregates=debug"); overrides RUST_LOG/defaults
    #[arg(long)]
    log_filter: Option<String>,
}

const DEFAULT_LOG_FILTER: &str = "info,featuregates=info";

fn init_logging(cli_filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }
    builder.format_timestamp_secs();
    builder.format(|buf, record| {
        let ts = buf.timestamp();
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("event=featuregates_signal_error error={err}");
        }
    };
    run(cli, ctrl_c).await
}

async fn run(cli: Cli, shutdown_signal: impl Future<Output = ()> + Send) -> Result<()> {
    init_logging(cli.log_filter.as_deref());
    let settings = match &cli.config {
        Some(path) => load_settings(path)
            .with_context(|| format!("load settings {}", path.display()))?,
        None => Settings::default(),
    };
    let mut env = DiscoveryEnv::from_env().context("read pod identity from environment")?;
    if let Some(namespace) = &settings.namespace {
        env = env.with_namespace(namespace.clone());
    }
    let api = build_cluster_api(&settings)?;
    info!(
        "event=featuregates_cluster_api server={} pod={}/{} config_map={}",
        api.base_url(),
        env.namespace,
        env.pod_name,
        env.config_map_name
    );

    let registry = Arc::new(FeatureGateRegistry::antrea());
    info!(
        "event=featuregates_registry_loaded platform={} gates={}",
        registry.platform().as_str(),
        registry.len()
    );
    let handler = Arc::new(
        FeatureGatesHandler::new(registry, Arc::new(api), env)
            .with_cache_ttl(settings.cache_ttl()),
    );

    let mut config = FeatureGatesHttpServerConfig::new(settings.bind_addr(cli.bind.as_deref())?);
    config.max_connections = settings.max_connections;
    if let Some(timeout) = settings.request_timeout() {
        config.request_timeout = timeout;
    }
    let mut server = AsyncFeatureGatesHttpServer::spawn(config, handler)
        .await
        .context("start feature-gates listener")?;
    info!("event=featuregates_listening addr={}", server.local_addr());

    shutdown_signal.await;
    info!("event=featuregates_shutdown");
    server.shutdown().await;
    Ok(())
}

fn build_cluster_api(settings: &Settings) -> Result<HttpClusterApi> {
    let Some(api) = &settings.cluster_api else {
        return HttpClusterApi::in_cluster().context("configure in-cluster API client");
    };
    let trust = load_trust_store_from_pem(&api.ca_file)
        .with_context(|| format!("load CA bundle {}", api.ca_file.display()))?;
    let mut builder = HttpClusterApiBuilder::new(&api.server)?.trust_store(trust);
    if let Some(token) = &api.token_file {
        builder = builder
            .bearer_token_file(token.clone())
            .with_context(|| format!("read token {}", token.display()))?;
    }
    if let Some(timeout) = api.timeout() {
        builder = builder.socket_timeout(timeout);
    }
    Ok(builder.build()?)
}
