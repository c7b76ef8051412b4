use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use shellgate_core::{
    build_router, CredentialCodec, CredentialKey, ServerConfig, ShellgateConfig,
};
use shellgate_core::shell::SshConnector;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_filter())
        .init();

    // Fail before binding: without a key every connect would fail the same way.
    let key = match CredentialKey::from_env() {
        Ok(key) => key,
        Err(err) => {
            tracing::error!(error = %err, "credential key misconfigured");
            return Err(err.into());
        }
    };

    let file_config = load_file_config();
    let defaults = ServerConfig::default();

    let config = ServerConfig {
        bind: parse_socket("SHELLGATE_BIND", defaults.bind),
        heartbeat_interval: parse_duration("SHELLGATE_HEARTBEAT_SECS", defaults.heartbeat_interval),
        idle_timeout: parse_duration("SHELLGATE_IDLE_SECS", defaults.idle_timeout),
        connect_timeout: parse_duration("SHELLGATE_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
        max_connections: parse_usize("SHELLGATE_MAX_CONNECTIONS", defaults.max_connections),
        output_buffer: parse_usize("SHELLGATE_OUTPUT_BUFFER", defaults.output_buffer),
        ssh: file_config.ssh,
    };

    let app = build_router(config.clone(), CredentialCodec::new(key), SshConnector::new());

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        connect_timeout = ?config.connect_timeout,
        max_connections = config.max_connections,
        "listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn load_file_config() -> ShellgateConfig {
    match ShellgateConfig::load() {
        Ok(config) => config,
        Err(err) => {
            let path = ShellgateConfig::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "~/.shellgate/config.toml".to_string());
            tracing::warn!(%path, error = %err, "failed to load shellgate config; using defaults");
            ShellgateConfig::default()
        }
    }
}

fn parse_socket(key: &str, default: SocketAddr) -> SocketAddr {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_duration(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map(Duration::from_secs).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_usize(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(v) => v.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn tracing_filter() -> tracing_subscriber::EnvFilter {
    let explicit = env::var("SHELLGATE_LOG").or_else(|_| env::var("RUST_LOG")).ok();
    if let Some(filter) = explicit {
        return tracing_subscriber::EnvFilter::new(filter);
    }
    if matches!(
        env::var("SHELLGATE_DEBUG").as_deref(),
        Ok("1" | "true" | "TRUE" | "yes" | "YES")
    ) {
        return tracing_subscriber::EnvFilter::new("debug");
    }
    tracing_subscriber::EnvFilter::new("info")
}
