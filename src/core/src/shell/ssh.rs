use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult, KeyboardInteractiveAuthResponse};
use russh::keys::{HashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use shellgate_protocol::{ConnectTarget, TerminalGeometry};
use tokio::task::JoinHandle;

use super::{
    drive_channel, BoxFuture, ChannelIo, ConnectOptions, RemoteSession, ShellChannel,
    ShellConnector,
};
use crate::credential::Credential;
use crate::error::GatewayError;

/// Upper bound on keyboard-interactive prompt rounds.
const MAX_INTERACTIVE_ROUNDS: usize = 8;
/// How long `dispose` waits for the channel driver to flush its close.
const DRIVER_DRAIN: Duration = Duration::from_secs(2);

/// Connects over SSH using russh.
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }
}

impl ShellConnector for SshConnector {
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
        credential: Credential,
        options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteSession>, GatewayError>> {
        Box::pin(async move {
            let config = client::Config {
                nodelay: true,
                inactivity_timeout: None,
                keepalive_interval: options.keepalive_interval,
                keepalive_max: options.keepalive_max,
                ..Default::default()
            };
            let handler = HostKeyLogger {
                host: target.host.clone(),
            };

            tracing::info!(remote = %target, "connecting to remote host");
            let mut handle = client::connect(
                Arc::new(config),
                (target.host.as_str(), target.port),
                handler,
            )
            .await
            .map_err(|e| GatewayError::NetworkUnreachable(e.to_string()))?;

            authenticate(&mut handle, target, &credential, options).await?;
            drop(credential);
            tracing::info!(remote = %target, "authenticated");

            Ok(Box::new(SshSession {
                handle: Some(handle),
                driver: None,
            }) as Box<dyn RemoteSession>)
        })
    }
}

struct HostKeyLogger {
    host: String,
}

impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        tracing::info!(
            host = %self.host,
            algo = %key.algorithm(),
            fingerprint = %key.fingerprint(HashAlg::Sha256),
            "accepting host key"
        );
        Ok(true)
    }
}

async fn authenticate(
    handle: &mut client::Handle<HostKeyLogger>,
    target: &ConnectTarget,
    credential: &Credential,
    options: &ConnectOptions,
) -> Result<(), GatewayError> {
    let result = handle
        .authenticate_password(target.username.clone(), credential.expose())
        .await
        .map_err(|e| GatewayError::AuthFailed(e.to_string()))?;
    if matches!(result, AuthResult::Success) {
        return Ok(());
    }
    tracing::debug!(remote = %target, "password auth rejected");

    if options.try_keyboard_interactive {
        let mut response = handle
            .authenticate_keyboard_interactive_start(target.username.clone(), None::<String>)
            .await
            .map_err(|e| GatewayError::AuthFailed(e.to_string()))?;
        for _ in 0..MAX_INTERACTIVE_ROUNDS {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(()),
                KeyboardInteractiveAuthResponse::Failure { .. } => break,
                KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                    let answers = prompts
                        .iter()
                        .map(|_| credential.expose().to_string())
                        .collect();
                    response = handle
                        .authenticate_keyboard_interactive_respond(answers)
                        .await
                        .map_err(|e| GatewayError::AuthFailed(e.to_string()))?;
                }
            }
        }
        tracing::debug!(remote = %target, "keyboard-interactive auth rejected");
    }

    Err(GatewayError::AuthFailed(format!(
        "server rejected credentials for {}",
        target.username
    )))
}

struct SshSession {
    handle: Option<client::Handle<HostKeyLogger>>,
    driver: Option<JoinHandle<()>>,
}

impl RemoteSession for SshSession {
    fn open_shell<'a>(
        &'a mut self,
        geometry: TerminalGeometry,
        options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<ShellChannel, GatewayError>> {
        Box::pin(async move {
            let handle = self
                .handle
                .as_ref()
                .ok_or_else(|| GatewayError::ShellOpenFailed("session disposed".into()))?;
            let channel = handle
                .channel_open_session()
                .await
                .map_err(|e| GatewayError::ShellOpenFailed(format!("open channel: {e}")))?;
            channel
                .request_pty(
                    true,
                    &options.term,
                    geometry.cols,
                    geometry.rows,
                    geometry.width,
                    geometry.height,
                    &[],
                )
                .await
                .map_err(|e| GatewayError::ShellOpenFailed(format!("request pty: {e}")))?;
            channel
                .request_shell(true)
                .await
                .map_err(|e| GatewayError::ShellOpenFailed(format!("request shell: {e}")))?;

            let (shell, endpoint) = ShellChannel::new(options.output_buffer);
            self.driver = Some(tokio::spawn(drive_channel(SshChannelIo(channel), endpoint)));
            Ok(shell)
        })
    }

    fn dispose(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut driver) = self.driver.take() {
                if tokio::time::timeout(DRIVER_DRAIN, &mut driver).await.is_err() {
                    tracing::debug!("channel driver did not stop in time; aborting");
                    driver.abort();
                }
            }
            if let Some(handle) = self.handle.take() {
                if let Err(e) = handle
                    .disconnect(Disconnect::ByApplication, "session closed", "en")
                    .await
                {
                    tracing::debug!(error = %e, "ssh disconnect failed");
                }
            }
        })
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// A russh session channel as a [`ChannelIo`].
struct SshChannelIo(russh::Channel<client::Msg>);

impl ChannelIo for SshChannelIo {
    async fn read(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.0.wait().await {
                Some(ChannelMsg::Data { data }) => return Some(data.to_vec()),
                Some(ChannelMsg::ExtendedData { data, .. }) => return Some(data.to_vec()),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!(exit_status, "remote shell exited");
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return None,
                _ => {}
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        self.0.data(data).await.map_err(|e| {
            tracing::debug!(error = %e, "ssh channel write failed");
            GatewayError::ChannelClosed
        })
    }

    async fn resize(&mut self, geometry: TerminalGeometry) {
        if let Err(e) = self
            .0
            .window_change(geometry.cols, geometry.rows, geometry.width, geometry.height)
            .await
        {
            tracing::debug!(error = %e, "window change ignored");
        }
    }

    async fn close(&mut self) {
        let _ = self.0.eof().await;
        let _ = self.0.close().await;
    }
}
