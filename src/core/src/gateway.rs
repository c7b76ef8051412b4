use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use shellgate_protocol::{
    decode_client_event, encode_server_event, ClientEvent, ConnectRequest, ServerEvent,
    TerminalGeometry,
};
use tokio::sync::mpsc::{self, error::TrySendError, Permit};
use tracing::Instrument;
use uuid::Uuid;

use crate::credential::CredentialCodec;
use crate::debug_bytes::{fmt_bytes, terminal_debug_enabled_for};
use crate::error::GatewayError;
use crate::registry::ConnectionGuard;
use crate::shell::{ConnectOptions, RemoteSession, ShellChannel, ShellConnector};
use crate::utf8::Utf8Stream;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_IDLE: u16 = 4000;
const CLOSE_CONNECT_FAILED: u16 = 4001;

/// Frames queued for the client writer task.
const OUTBOUND_QUEUE: usize = 64;
/// How long a status or close frame may wait for queue space.
const SEND_GRACE: Duration = Duration::from_secs(5);
/// How long the writer may keep flushing after the session ends.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Everything one client connection needs from the process.
#[derive(Clone)]
pub struct GatewayParams {
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub options: ConnectOptions,
    pub codec: Arc<CredentialCodec>,
    pub connector: Arc<dyn ShellConnector>,
}

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Authenticating,
    Streaming,
    Closed,
}

enum Flow {
    Continue,
    Stop,
}

/// The remote half of a connection. Released at most once.
#[derive(Default)]
struct Remote {
    session: Option<Box<dyn RemoteSession>>,
    shell: Option<ShellChannel>,
    torn_down: bool,
}

impl Remote {
    /// Close the shell and dispose the session. Later calls do nothing.
    async fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;
        if let Some(mut shell) = self.shell.take() {
            shell.close();
        }
        if let Some(mut session) = self.session.take() {
            session.dispose().await;
        }
        true
    }
}

/// Client events that arrive while the remote side is still being set up.
#[derive(Debug, Default)]
struct Pending {
    geometry: Option<TerminalGeometry>,
    input: Vec<Vec<u8>>,
}

/// Sending half of the client connection.
///
/// Frames go through a bounded queue to [`write_frames`], so a client that
/// stops reading never blocks the loop that reads from it.
struct Outbound {
    tx: mpsc::Sender<Message>,
}

impl Outbound {
    fn spawn(sink: WsSink) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        (Self { tx }, tokio::spawn(write_frames(sink, rx)))
    }

    /// Queue a status event. `false` if the client is gone or not draining.
    async fn event(&self, event: &ServerEvent) -> bool {
        match event_frame(event) {
            Some(frame) => self.tx.send_timeout(frame, SEND_GRACE).await.is_ok(),
            None => true,
        }
    }

    async fn close(&self, code: u16, reason: &str) {
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }));
        let _ = self.tx.send_timeout(frame, SEND_GRACE).await;
    }

    /// Queue a control frame without waiting. Dropped if the queue is full.
    fn control(&self, frame: Message) -> Result<(), TrySendError<Message>> {
        match self.tx.try_send(frame) {
            Err(TrySendError::Full(_)) => Ok(()),
            other => other,
        }
    }
}

/// What the shell side produced, paired with queue space for the client.
enum Output<'a> {
    Chunk(Permit<'a, Message>, Vec<u8>),
    Closed,
    ClientGone,
}

/// Wait for room in the client queue, then for the next shell chunk.
///
/// Output is only pulled from the shell when it can be queued immediately,
/// which leaves the backlog in the shell channel instead of in memory here.
async fn next_output<'a>(shell: &mut Option<ShellChannel>, outbound: &'a Outbound) -> Output<'a> {
    let Some(shell) = shell else {
        return std::future::pending().await;
    };
    let Ok(permit) = outbound.tx.reserve().await else {
        return Output::ClientGone;
    };
    match shell.recv().await {
        Some(chunk) => Output::Chunk(permit, chunk),
        None => Output::Closed,
    }
}

struct Gateway {
    conn_id: Uuid,
    params: GatewayParams,
    phase: Phase,
    pending: Pending,
    remote: Remote,
    decoder: Utf8Stream,
    debug_bytes: bool,
}

/// Run one client connection to completion.
pub async fn run_session(
    socket: WebSocket,
    params: GatewayParams,
    registration: ConnectionGuard,
) {
    let conn_id = registration.id();
    let span = tracing::info_span!("conn", id = %conn_id, peer = %registration.info().remote_ip);
    async move {
        let mut gateway = Gateway {
            conn_id,
            params,
            phase: Phase::Idle,
            pending: Pending::default(),
            remote: Remote::default(),
            decoder: Utf8Stream::new(),
            debug_bytes: terminal_debug_enabled_for(conn_id),
        };
        tracing::info!("client connected");
        gateway.run(socket).await;
        tracing::info!(elapsed = ?registration.info().started_at.elapsed(), "client connection closed");
        drop(registration);
    }
    .instrument(span)
    .await
}

impl Gateway {
    async fn run(&mut self, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let (outbound, mut writer) = Outbound::spawn(sink);

        let idle_timeout = self.params.idle_timeout;
        let mut idle_deadline = tokio::time::Instant::now() + idle_timeout;
        let mut heartbeat = tokio::time::interval(self.params.heartbeat_interval);
        heartbeat.tick().await; // consume immediate first tick

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let flow = match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, &outbound, &mut stream).await
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.forward_input(data.to_vec());
                            Flow::Continue
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = outbound.control(Message::Pong(data));
                            Flow::Continue
                        }
                        Some(Ok(Message::Pong(_))) => Flow::Continue,
                        Some(Ok(Message::Close(frame))) => {
                            match frame {
                                Some(frame) => tracing::info!(code = %frame.code, reason = %frame.reason, "ws close"),
                                None => tracing::info!("ws close"),
                            }
                            Flow::Stop
                        }
                        None => {
                            tracing::info!("ws stream ended");
                            Flow::Stop
                        }
                        Some(Err(e)) => {
                            tracing::warn!("ws error: {e}");
                            Flow::Stop
                        }
                    };
                    if let Flow::Stop = flow {
                        break;
                    }
                    // Measured after handling so a slow connect is not idle time.
                    idle_deadline = tokio::time::Instant::now() + idle_timeout;
                }
                out = next_output(&mut self.remote.shell, &outbound) => {
                    match out {
                        Output::Chunk(permit, chunk) => {
                            if self.debug_bytes {
                                tracing::info!(msg = %fmt_bytes(&chunk, 80), "terminal out");
                            }
                            let text = self.decoder.decode(&chunk);
                            if text.is_empty() {
                                continue;
                            }
                            if let Some(frame) = event_frame(&ServerEvent::data(text)) {
                                permit.send(frame);
                            }
                        }
                        Output::Closed => {
                            tracing::info!("remote shell closed");
                            let tail = self.decoder.finish();
                            if !tail.is_empty() {
                                outbound.event(&ServerEvent::data(tail)).await;
                            }
                            outbound.event(&ServerEvent::disconnected()).await;
                            outbound.close(CLOSE_NORMAL, "remote shell closed").await;
                            break;
                        }
                        Output::ClientGone => {
                            tracing::info!("client gone while sending output");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if outbound.control(Message::Ping(Vec::new().into())).is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(idle_deadline) => {
                    tracing::info!("idle timeout");
                    outbound.close(CLOSE_IDLE, "idle timeout").await;
                    break;
                }
            }
        }

        // The writer flushes what is queued while the remote side is released.
        drop(outbound);
        if self.remote.teardown().await {
            tracing::debug!(phase = ?self.phase, "remote session released");
        }
        self.phase = Phase::Closed;
        if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
            tracing::debug!("client not draining; dropping queued frames");
            writer.abort();
        }
    }

    async fn handle_text(&mut self, text: &str, outbound: &Outbound, stream: &mut WsStream) -> Flow {
        let event = match decode_client_event(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("failed to decode client event: {e}");
                return Flow::Continue;
            }
        };
        match event {
            ClientEvent::Connect(req) => {
                if self.phase != Phase::Idle {
                    tracing::warn!(phase = ?self.phase, "connect ignored; session already started");
                    return Flow::Continue;
                }
                self.handle_connect(req, outbound, stream).await
            }
            ClientEvent::Input { data } => {
                self.forward_input(data.into_bytes());
                Flow::Continue
            }
            ClientEvent::Resize(geometry) => {
                match &self.remote.shell {
                    Some(shell) => shell.resize(geometry),
                    None => self.pending.geometry = Some(geometry),
                }
                Flow::Continue
            }
        }
    }

    fn forward_input(&mut self, data: Vec<u8>) {
        let Some(shell) = &self.remote.shell else {
            tracing::debug!(len = data.len(), "input before shell is open dropped");
            return;
        };
        if self.debug_bytes {
            tracing::info!(msg = %fmt_bytes(&data, 80), "terminal in");
        }
        // A failed write means the driver is gone; its output stream ends
        // next and drives the disconnect.
        if let Err(e) = shell.write(data) {
            tracing::debug!(error = %e, "input dropped");
        }
    }

    async fn handle_connect(
        &mut self,
        req: ConnectRequest,
        outbound: &Outbound,
        stream: &mut WsStream,
    ) -> Flow {
        self.phase = Phase::Authenticating;
        match self.establish(req, outbound, stream).await {
            Ok(true) => {
                self.phase = Phase::Streaming;
                tracing::info!("streaming");
                Flow::Continue
            }
            Ok(false) => {
                tracing::info!("client left during connect");
                Flow::Stop
            }
            Err(err) => {
                tracing::warn!(error = %err, "connect failed");
                outbound.event(&ServerEvent::error(err.to_string())).await;
                outbound.close(CLOSE_CONNECT_FAILED, "connect failed").await;
                Flow::Stop
            }
        }
    }

    /// Decrypt, connect and open the shell. `Ok(false)` means the client
    /// went away first.
    async fn establish(
        &mut self,
        req: ConnectRequest,
        outbound: &Outbound,
        stream: &mut WsStream,
    ) -> Result<bool, GatewayError> {
        let target = req.target()?;
        let credential = self.params.codec.decrypt(&req.encrypted_credential)?;
        tracing::info!(remote = %target, "connect requested");

        let timeout = self.params.options.connect_timeout;
        let connecting = tokio::time::timeout(
            timeout,
            self.params
                .connector
                .connect(&target, credential, &self.params.options),
        );
        let session = match race_client(connecting, stream, &mut self.pending).await {
            None => return Ok(false),
            Some(Err(_)) => return Err(GatewayError::ConnectTimeout(timeout.as_secs())),
            Some(Ok(result)) => result?,
        };
        let session = self.remote.session.insert(session);

        if !outbound.event(&ServerEvent::connected()).await {
            return Ok(false);
        }

        let geometry = self.pending.geometry.take().unwrap_or_default();
        let opening = tokio::time::timeout(timeout, session.open_shell(geometry, &self.params.options));
        let shell = match race_client(opening, stream, &mut self.pending).await {
            None => return Ok(false),
            Some(Err(_)) => return Err(GatewayError::ConnectTimeout(timeout.as_secs())),
            Some(Ok(result)) => result?,
        };
        if let Some(latest) = self.pending.geometry.take() {
            shell.resize(latest);
        }
        for data in self.pending.input.drain(..) {
            if let Err(e) = shell.write(data) {
                tracing::debug!(error = %e, "buffered input dropped");
                break;
            }
        }
        tracing::debug!(conn = %self.conn_id, rows = geometry.rows, cols = geometry.cols, "shell open");
        self.remote.shell = Some(shell);
        Ok(true)
    }
}

/// Drive `fut` while still watching the client. Resizes and input are held
/// in `pending`; a client disconnect abandons `fut` and yields `None`.
async fn race_client<F: Future>(
    fut: F,
    stream: &mut WsStream,
    pending: &mut Pending,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            out = &mut fut => return Some(out),
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_client_event(&text) {
                    Ok(ClientEvent::Resize(geometry)) => pending.geometry = Some(geometry),
                    Ok(ClientEvent::Input { data }) => pending.input.push(data.into_bytes()),
                    Ok(ClientEvent::Connect(_)) => {
                        tracing::warn!("connect ignored; already connecting");
                    }
                    Err(e) => tracing::warn!("failed to decode client event: {e}"),
                },
                Some(Ok(Message::Binary(data))) => pending.input.push(data.to_vec()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => {}
            },
        }
    }
}

fn event_frame(event: &ServerEvent) -> Option<Message> {
    match encode_server_event(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!("failed to encode server event: {e}");
            None
        }
    }
}

/// Drain `rx` into the socket. Stops after a close frame or a write error.
async fn write_frames(mut sink: WsSink, mut rx: mpsc::Receiver<Message>) {
    while let Some(frame) = rx.recv().await {
        let closing = matches!(frame, Message::Close(_));
        if let Err(e) = sink.send(frame).await {
            tracing::debug!(error = %e, "client write failed");
            return;
        }
        if closing {
            return;
        }
    }
    let _ = sink.close().await;
}
