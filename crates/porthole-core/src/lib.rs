//! Tunnel lifecycle core
//!
//! Composes port reservation, relay provisioning, connection-info resolution
//! and the proxy session into the single `open` operation exposed to the CLI.

pub mod lifecycle;
pub mod orchestrator;
pub mod port;
pub mod session;

pub use lifecycle::{RelayConfig, RelayLifecycleManager, RELAY_APP_NAME, RELAY_AUTH_ENV};
pub use orchestrator::TunnelOrchestrator;
pub use port::PortAllocator;
pub use session::TunnelSession;

use porthole_platform::PlatformError;
use porthole_relay::RelayError;
use thiserror::Error;

/// Tunnel lifecycle errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Relay payload {0} does not exist")]
    PayloadMissing(String),

    #[error("Relay application failed to start")]
    RelayStartTimeout,

    #[error("Could not connect to local tunnel")]
    LocalUnreachable,

    #[error("Tunnel was not started")]
    NotStarted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
