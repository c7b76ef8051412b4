#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use shellgate_core::shell::{
    drive_channel, BoxFuture, ChannelEndpoint, ChannelIo, ConnectOptions, RemoteSession,
    ShellChannel, ShellCommand, ShellConnector,
};
use shellgate_core::{Credential, CredentialCodec, CredentialKey, GatewayError, ServerConfig};
use shellgate_protocol::{ConnectTarget, ServerEvent, TerminalGeometry};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub const KEY_HEX: &str = "8f3c2a1b4d5e6f708192a3b4c5d6e7f80112233445566778899aabbccddeeff0";

// ── Simulated remote shell ───────────────────────────────────────────

/// What the simulated remote does on connect / shell open.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Accept, then echo every input chunk back as output.
    Echo,
    /// Accept, send these chunks, then echo.
    Banner(Vec<Vec<u8>>),
    RejectAuth,
    /// Echo, but only after the connect itself has taken this long.
    Delayed(Duration),
    /// Never finish connecting.
    Hang,
    /// Emit chunks of this size as fast as the gateway takes them.
    Flood(usize),
    ShellFails,
}

#[derive(Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub shell_opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub disposes: AtomicUsize,
    pub passwords: Mutex<Vec<String>>,
    pub targets: Mutex<Vec<ConnectTarget>>,
    pub open_geometry: Mutex<Option<TerminalGeometry>>,
    pub resizes: Mutex<Vec<TerminalGeometry>>,
    pub inputs: Mutex<Vec<Vec<u8>>>,
    pub remote_close: Notify,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector {
    pub behavior: Behavior,
    pub counters: Arc<Counters>,
}

impl ShellConnector for FakeConnector {
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
        credential: Credential,
        _options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteSession>, GatewayError>> {
        Box::pin(async move {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            self.counters
                .passwords
                .lock()
                .unwrap()
                .push(credential.expose().to_string());
            self.counters.targets.lock().unwrap().push(target.clone());
            match &self.behavior {
                Behavior::RejectAuth => Err(GatewayError::AuthFailed(
                    "server rejected credentials".into(),
                )),
                Behavior::Hang => std::future::pending().await,
                Behavior::Delayed(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(Box::new(FakeSession {
                        behavior: Behavior::Echo,
                        counters: self.counters.clone(),
                    }) as Box<dyn RemoteSession>)
                }
                behavior => Ok(Box::new(FakeSession {
                    behavior: behavior.clone(),
                    counters: self.counters.clone(),
                }) as Box<dyn RemoteSession>),
            }
        })
    }
}

struct FakeSession {
    behavior: Behavior,
    counters: Arc<Counters>,
}

impl RemoteSession for FakeSession {
    fn open_shell<'a>(
        &'a mut self,
        geometry: TerminalGeometry,
        options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<ShellChannel, GatewayError>> {
        Box::pin(async move {
            self.counters.shell_opens.fetch_add(1, Ordering::SeqCst);
            *self.counters.open_geometry.lock().unwrap() = Some(geometry);
            let banner = match &self.behavior {
                Behavior::ShellFails => {
                    return Err(GatewayError::ShellOpenFailed("pty refused".into()))
                }
                Behavior::Flood(size) => {
                    let (shell, endpoint) = ShellChannel::new(options.output_buffer);
                    let io = FloodIo {
                        size: *size,
                        counters: self.counters.clone(),
                    };
                    tokio::spawn(drive_channel(io, endpoint));
                    return Ok(shell);
                }
                Behavior::Banner(chunks) => chunks.clone(),
                _ => Vec::new(),
            };
            let (shell, endpoint) = ShellChannel::new(options.output_buffer);
            tokio::spawn(echo_driver(endpoint, banner, self.counters.clone()));
            Ok(shell)
        })
    }

    fn dispose(&mut self) -> BoxFuture<'_, ()> {
        let counters = self.counters.clone();
        Box::pin(async move {
            counters.disposes.fetch_add(1, Ordering::SeqCst);
        })
    }
}

async fn echo_driver(endpoint: ChannelEndpoint, banner: Vec<Vec<u8>>, counters: Arc<Counters>) {
    let ChannelEndpoint {
        output,
        mut commands,
    } = endpoint;
    for chunk in banner {
        if output.send(chunk).await.is_err() {
            return;
        }
    }
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(ShellCommand::Input(data)) => {
                    if output.send(data).await.is_err() {
                        break;
                    }
                }
                Some(ShellCommand::Resize(geometry)) => {
                    counters.resizes.lock().unwrap().push(geometry);
                }
                Some(ShellCommand::Close) => {
                    counters.closes.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                None => break,
            },
            _ = counters.remote_close.notified() => break,
        }
    }
}

/// Produces output as fast as it is taken; records what the gateway sends.
struct FloodIo {
    size: usize,
    counters: Arc<Counters>,
}

impl ChannelIo for FloodIo {
    async fn read(&mut self) -> Option<Vec<u8>> {
        tokio::task::yield_now().await;
        Some(vec![b'y'; self.size])
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        self.counters.inputs.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn resize(&mut self, geometry: TerminalGeometry) {
        self.counters.resizes.lock().unwrap().push(geometry);
    }

    async fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Server + client helpers ──────────────────────────────────────────

pub fn codec() -> CredentialCodec {
    CredentialCodec::new(CredentialKey::from_secret(KEY_HEX).unwrap())
}

pub async fn start_server(config: ServerConfig, behavior: Behavior) -> (SocketAddr, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let connector = FakeConnector {
        behavior,
        counters: counters.clone(),
    };
    let app = shellgate_core::build_router(config, codec(), connector);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, counters)
}

pub async fn connect_ws(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    stream
}

pub fn text_msg(s: String) -> tungstenite::Message {
    tungstenite::Message::Text(s.into())
}

pub fn connect_request(credential: &str) -> tungstenite::Message {
    text_msg(
        serde_json::json!({
            "type": "connect",
            "host": "10.0.0.5",
            "port": 22,
            "username": "ops",
            "encryptedCredential": credential,
        })
        .to_string(),
    )
}

pub fn input(data: &str) -> tungstenite::Message {
    text_msg(serde_json::json!({ "type": "input", "data": data }).to_string())
}

pub fn resize(rows: u32, cols: u32, height: u32, width: u32) -> tungstenite::Message {
    text_msg(
        serde_json::json!({
            "type": "resize",
            "rows": rows,
            "cols": cols,
            "height": height,
            "width": width,
        })
        .to_string(),
    )
}

/// Read the next text message, auto-replying to pings.
pub async fn next_text(ws: &mut WsStream) -> String {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        tokio::select! {
            msg = ws.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(t))) => return t.to_string(),
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        let _ = ws.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => continue,
                    Some(Ok(other)) => panic!("unexpected message: {other:?}"),
                    Some(Err(e)) => panic!("ws error: {e}"),
                    None => panic!("ws stream ended unexpectedly"),
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                panic!("timeout waiting for text message");
            }
        }
    }
}

pub async fn next_event(ws: &mut WsStream) -> ServerEvent {
    let t = next_text(ws).await;
    serde_json::from_str(&t).unwrap_or_else(|e| panic!("bad server event {t}: {e}"))
}

/// Collect server events until the socket closes. Panics on timeout.
pub async fn events_until_close(ws: &mut WsStream) -> Vec<ServerEvent> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    loop {
        tokio::select! {
            msg = ws.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(t))) => {
                        events.push(serde_json::from_str(&t).unwrap());
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None | Some(Err(_)) => {
                        return events;
                    }
                    Some(Ok(_)) => continue,
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                panic!("timeout waiting for close; got {events:?}");
            }
        }
    }
}

/// Read until a Close frame, EOF, or error. Returns true if closed in time.
pub async fn expect_close(ws: &mut WsStream, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        tokio::select! {
            msg = ws.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Close(_))) | None | Some(Err(_)) => return true,
                    // Pings are left unanswered so the server sees an idle client.
                    Some(Ok(_)) => continue,
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return false;
            }
        }
    }
}

/// Read `data` events until their concatenation is at least `len` bytes.
pub async fn collect_data(ws: &mut WsStream, len: usize) -> String {
    let mut out = String::new();
    while out.len() < len {
        match next_event(ws).await {
            ServerEvent::Data { data } => out.push_str(&data),
            other => panic!("expected data, got {other:?}"),
        }
    }
    out
}

/// Poll `counter` until it reaches `expected` or two seconds pass.
pub async fn wait_for(counter: &AtomicUsize, expected: usize) -> usize {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let value = counter.load(Ordering::SeqCst);
        if value >= expected || tokio::time::Instant::now() >= deadline {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
