//! Platform application-management capability
//!
//! The tunnel core drives a remote relay application through the
//! [`PlatformClient`] trait; [`HttpPlatformClient`] is the REST-backed
//! implementation used by the CLI.

pub mod http;

pub use http::HttpPlatformClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Platform API errors
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Platform request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid platform target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Application {0} not found")]
    AppNotFound(String),

    #[error("Unexpected platform response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Failed to read application payload {path}: {source}")]
    Payload {
        path: String,
        source: std::io::Error,
    },
}

/// A provisioned service instance on the platform - the tunnel target.
///
/// Immutable for the lifetime of a tunnel session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub vendor: Vendor,
    #[serde(default)]
    pub version: Option<String>,
}

/// Service vendor tag, as reported by the platform catalog.
///
/// Vendors with tunnel-specific connection semantics get their own variant;
/// anything else passes through as [`Vendor::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Vendor {
    RabbitMq,
    MongoDb,
    Redis,
    Other(String),
}

impl Vendor {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "rabbitmq" => Vendor::RabbitMq,
            "mongodb" => Vendor::MongoDb,
            "redis" => Vendor::Redis,
            _ => Vendor::Other(tag.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Vendor::RabbitMq => "rabbitmq",
            Vendor::MongoDb => "mongodb",
            Vendor::Redis => "redis",
            Vendor::Other(tag) => tag,
        }
    }
}

impl From<String> for Vendor {
    fn from(tag: String) -> Self {
        Vendor::from_tag(&tag)
    }
}

impl From<Vendor> for String {
    fn from(vendor: Vendor) -> Self {
        vendor.tag().to_string()
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Point-in-time view of a platform application.
///
/// Never held across mutating calls; the lifecycle manager re-fetches a
/// fresh snapshot after every create/delete/bind/restart.
#[derive(Debug, Clone)]
pub struct AppSnapshot {
    /// Platform-reported hostname for the application (no scheme).
    pub url: String,
    /// Environment entries in "KEY=VALUE" form.
    pub env: Vec<String>,
    /// Names of service instances bound to the application.
    pub services: Vec<String>,
}

impl AppSnapshot {
    /// Value of an environment entry, if present.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

/// Settings for creating a platform application.
#[derive(Debug, Clone, Serialize)]
pub struct AppManifest {
    pub name: String,
    pub framework: String,
    pub url: String,
    pub instances: u32,
    pub memory_mb: u32,
    pub env: Vec<String>,
    pub services: Vec<String>,
}

/// Application-management operations consumed by the tunnel core.
///
/// One method per platform call so implementations stay stateless; all
/// mutations are fire-and-forget from the core's perspective (it re-reads
/// state through [`PlatformClient::app_snapshot`] afterwards).
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Target API hostname, e.g. "api.platform.example.com".
    fn target(&self) -> &str;

    async fn list_services(&self) -> Result<Vec<ServiceInstance>, PlatformError>;

    async fn app_exists(&self, name: &str) -> Result<bool, PlatformError>;
    async fn app_snapshot(&self, name: &str) -> Result<AppSnapshot, PlatformError>;
    async fn app_healthy(&self, name: &str) -> Result<bool, PlatformError>;

    async fn create_app(&self, manifest: &AppManifest) -> Result<(), PlatformError>;
    async fn upload_app(&self, name: &str, payload: &Path) -> Result<(), PlatformError>;
    async fn start_app(&self, name: &str) -> Result<(), PlatformError>;
    async fn stop_app(&self, name: &str) -> Result<(), PlatformError>;
    async fn restart_app(&self, name: &str) -> Result<(), PlatformError>;
    async fn delete_app(&self, name: &str) -> Result<(), PlatformError>;
    async fn bind_service(&self, app: &str, service: &str) -> Result<(), PlatformError>;
}
