mod config;
mod credential;
mod debug_bytes;
mod error;
mod gateway;
mod paths;
mod registry;
mod server;
mod shellgate_config;
pub mod shell;
mod utf8;

pub use config::{ServerConfig, SshSettings};
pub use credential::{Credential, CredentialCodec, CredentialError, CredentialKey, CREDENTIAL_KEY_ENV};
pub use error::GatewayError;
pub use gateway::{run_session, GatewayParams, Phase};
pub use registry::{ConnectionGuard, ConnectionInfo, ConnectionRegistry};
pub use server::build_router;
pub use shellgate_config::ShellgateConfig;
pub use utf8::Utf8Stream;
