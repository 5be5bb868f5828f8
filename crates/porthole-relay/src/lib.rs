//! Relay wire client and local data plane
//!
//! The remote relay is a small HTTP application colocated with the tunneled
//! service. This crate speaks its wire protocol: authenticated `/info` and
//! `/services/<name>` reads, and the per-connection tunnel endpoints used by
//! the local proxy.

pub mod client;
pub mod connection;
pub mod proxy;

pub use client::{RelayClient, RelayInfo, AUTH_HEADER, RELAY_VERSION};
pub use connection::{resolve, ConnectionInfo, RESOLVE_ATTEMPTS};
pub use proxy::TunnelProxy;

use thiserror::Error;
use uuid::Uuid;

/// Relay wire errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Cannot determine URL for {0}")]
    BaseUrlUndiscoverable(String),

    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected relay response ({status})")]
    UnexpectedResponse { status: u16 },

    #[error("Remote tunnel relay is unaware of {0}")]
    ServiceUnknown(String),

    #[error("Could not determine {field} for {service}")]
    MissingField { field: String, service: String },

    #[error("Tunnel closed by relay")]
    TunnelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared secret authenticating every request to the relay.
///
/// Generated once per relay provisioning and embedded in the relay's
/// environment; exactly one live token exists per relay instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AuthToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}
