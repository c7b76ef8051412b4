use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::credential::CredentialCodec;
use crate::gateway::{run_session, GatewayParams};
use crate::registry::ConnectionRegistry;
use crate::shell::{ConnectOptions, ShellConnector};

/// Shared state accessible by handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub gateway: GatewayParams,
    pub connections: ConnectionRegistry,
}

/// Build the axum router for the gateway.
///
/// The router exposes `/ws` (WebSocket upgrade, one session gateway per
/// socket) and `/health`. Callers should use
/// `into_make_service_with_connect_info::<SocketAddr>()` when binding to get
/// remote address extraction.
///
/// The codec is built from the process-wide key before this is called, so a
/// missing key can never surface as a per-connection decryption failure.
pub fn build_router(
    config: ServerConfig,
    codec: CredentialCodec,
    connector: impl ShellConnector,
) -> Router {
    let gateway = GatewayParams {
        heartbeat_interval: config.heartbeat_interval,
        idle_timeout: config.idle_timeout,
        options: ConnectOptions::from_config(&config),
        codec: Arc::new(codec),
        connector: Arc::new(connector),
    };
    let state = AppState {
        gateway,
        connections: ConnectionRegistry::new(config.max_connections),
    };

    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .layer(middleware::from_fn(extract_remote_ip))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Extension type for the remote IP, injected by middleware.
#[derive(Debug, Clone, Copy)]
struct RemoteIp(IpAddr);

async fn extract_remote_ip(
    req: Request<axum::body::Body>,
    next: middleware::Next,
) -> impl IntoResponse {
    let remote_ip = req
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

    let mut req = req;
    req.extensions_mut().insert(RemoteIp(remote_ip));
    next.run(req).await
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(
    State(state): State<AppState>,
    axum::Extension(RemoteIp(remote_ip)): axum::Extension<RemoteIp>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(registration) = state.connections.try_register(remote_ip) else {
        tracing::warn!(
            %remote_ip,
            active = state.connections.active(),
            "ws upgrade rejected: connection limit reached"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    tracing::debug!(%remote_ip, id = %registration.id(), "ws upgrade accepted");

    let params = state.gateway.clone();
    ws.on_upgrade(move |socket| run_session(socket, params, registration))
        .into_response()
}
