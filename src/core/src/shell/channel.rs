use std::future::Future;

use shellgate_protocol::TerminalGeometry;
use tokio::sync::mpsc;

use crate::error::GatewayError;

/// Requests queued from the gateway to a channel driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Input(Vec<u8>),
    Resize(TerminalGeometry),
    Close,
}

/// The driver side of a [`ShellChannel`].
///
/// A driver task pushes remote output into `output` in arrival order and
/// executes `commands`. Dropping `output` is the closure notification.
pub struct ChannelEndpoint {
    pub output: mpsc::Sender<Vec<u8>>,
    pub commands: mpsc::UnboundedReceiver<ShellCommand>,
}

/// Gateway side of an interactive shell channel.
pub struct ShellChannel {
    output: mpsc::Receiver<Vec<u8>>,
    commands: mpsc::UnboundedSender<ShellCommand>,
    closed: bool,
}

impl ShellChannel {
    /// Create a channel whose output queue holds `buffer` chunks.
    pub fn new(buffer: usize) -> (Self, ChannelEndpoint) {
        let (output_tx, output_rx) = mpsc::channel(buffer.max(1));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            Self {
                output: output_rx,
                commands: command_tx,
                closed: false,
            },
            ChannelEndpoint {
                output: output_tx,
                commands: command_rx,
            },
        )
    }

    /// Next output chunk. `None` once the channel has closed, from either end.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.output.recv().await
    }

    /// Queue raw input for the remote shell.
    pub fn write(&self, data: Vec<u8>) -> Result<(), GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::ChannelClosed);
        }
        self.commands
            .send(ShellCommand::Input(data))
            .map_err(|_| GatewayError::ChannelClosed)
    }

    /// Best-effort geometry update; dropped once the channel is closed.
    pub fn resize(&self, geometry: TerminalGeometry) {
        if self.is_closed() {
            return;
        }
        let _ = self.commands.send(ShellCommand::Resize(geometry));
    }

    /// Close the channel. Returns `true` only for the call that closed it.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let _ = self.commands.send(ShellCommand::Close);
        self.output.close();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.commands.is_closed()
    }
}

/// Transport operations a channel driver needs.
pub trait ChannelIo: Send {
    /// Next chunk of remote output. `None` once the remote side has closed.
    fn read(&mut self) -> impl Future<Output = Option<Vec<u8>>> + Send;

    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Failures are the transport's to log; they never end the channel.
    fn resize(&mut self, geometry: TerminalGeometry) -> impl Future<Output = ()> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Pump one transport channel: remote output into the endpoint, queued
/// commands into the transport. Returns when either side closes.
///
/// At most one output chunk waits for queue space. While it waits the
/// transport is not read, but commands keep flowing so input and close
/// still reach the remote behind a full output queue.
pub async fn drive_channel<C: ChannelIo>(mut io: C, endpoint: ChannelEndpoint) {
    let ChannelEndpoint {
        output,
        mut commands,
    } = endpoint;
    let mut held: Option<Vec<u8>> = None;

    loop {
        tokio::select! {
            biased;
            cmd = commands.recv() => match cmd {
                Some(ShellCommand::Input(data)) => {
                    if let Err(e) = io.write(&data).await {
                        tracing::debug!(error = %e, "channel write failed");
                        break;
                    }
                }
                Some(ShellCommand::Resize(geometry)) => io.resize(geometry).await,
                Some(ShellCommand::Close) | None => {
                    io.close().await;
                    break;
                }
            },
            permit = output.reserve(), if held.is_some() => match permit {
                Ok(permit) => {
                    if let Some(chunk) = held.take() {
                        permit.send(chunk);
                    }
                }
                // Gateway stopped reading; its Close command is next.
                Err(_) => held = None,
            },
            chunk = io.read(), if held.is_none() => match chunk {
                Some(chunk) => held = Some(chunk),
                None => {
                    tracing::debug!("remote closed channel");
                    break;
                }
            },
        }
    }
    // Dropping `output` here is what the gateway observes as channel closure.
}
