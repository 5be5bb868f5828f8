//! Relay lifecycle management
//!
//! Drives the remote relay application into a known-good state: present,
//! healthy, speaking the expected protocol version, and bound to the target
//! service. Platform state is read through fresh snapshots at each decision
//! point; nothing is cached across mutating calls.

use crate::TunnelError;
use porthole_platform::{AppManifest, PlatformClient, ServiceInstance};
use porthole_relay::{AuthToken, RelayClient, RELAY_VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name the relay application is provisioned under.
pub const RELAY_APP_NAME: &str = "tunnel-relay";

/// Environment entry carrying the shared secret into the relay.
pub const RELAY_AUTH_ENV: &str = "PORTHOLE_RELAY_AUTH";

/// Health polls after starting the relay before giving up.
pub const START_POLL_LIMIT: u32 = 60;

/// Provisioning parameters for the relay application.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub app_name: String,
    /// Deployable relay payload uploaded to the platform.
    pub payload: PathBuf,
    pub framework: String,
    pub memory_mb: u32,
    pub start_poll_limit: u32,
    pub poll_interval: Duration,
}

impl RelayConfig {
    pub fn new(payload: impl Into<PathBuf>) -> Self {
        Self {
            app_name: RELAY_APP_NAME.to_string(),
            payload: payload.into(),
            framework: "sinatra".to_string(),
            memory_mb: 64,
            start_poll_limit: START_POLL_LIMIT,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Relay ready for tunnel traffic.
pub struct ReadyRelay {
    pub token: AuthToken,
    pub client: RelayClient,
}

/// Ensures the remote relay exists, is healthy and is bound to the target
/// service, creating or recreating it as needed.
pub struct RelayLifecycleManager {
    platform: Arc<dyn PlatformClient>,
    config: RelayConfig,
}

impl RelayLifecycleManager {
    pub fn new(platform: Arc<dyn PlatformClient>, config: RelayConfig) -> Self {
        Self { platform, config }
    }

    /// Drive the relay to a ready state and hand back its auth token and
    /// wire client.
    ///
    /// Idempotent against an already-healthy, correctly-bound relay: no
    /// mutating platform call is made in that case.
    pub async fn ensure_ready(&self, service: &ServiceInstance) -> Result<ReadyRelay, TunnelError> {
        let name = &self.config.app_name;

        let ready = if self.platform.app_exists(name).await? {
            match self.probe_existing().await? {
                Some(ready) => ready,
                None => {
                    info!("Relay is unhealthy or incompatible, recreating it");
                    self.platform.delete_app(name).await?;
                    self.provision(service).await?
                }
            }
        } else {
            self.provision(service).await?
        };

        // Bindings only take effect on relay restart, so a rebind forces one
        // and the base URL must be discovered again afterwards.
        let snapshot = self.platform.app_snapshot(name).await?;
        if !snapshot.services.iter().any(|s| s == &service.name) {
            info!("Binding {} to the relay", service.name);
            self.platform.bind_service(name, &service.name).await?;
            self.platform.restart_app(name).await?;
            // the relay is rebooting here; discovery against it would fail
            self.wait_until_healthy().await?;

            let snapshot = self.platform.app_snapshot(name).await?;
            let client = RelayClient::discover(&snapshot.url).await?;
            return Ok(ReadyRelay {
                token: ready.token,
                client,
            });
        }

        Ok(ready)
    }

    /// Probe an already-deployed relay. `None` means it has to be torn down
    /// and recreated: missing token, failed health check, or a protocol
    /// version this client does not speak.
    async fn probe_existing(&self) -> Result<Option<ReadyRelay>, TunnelError> {
        let name = &self.config.app_name;
        let snapshot = self.platform.app_snapshot(name).await?;

        let token = match snapshot.env_value(RELAY_AUTH_ENV) {
            Some(value) => AuthToken::from(value.to_string()),
            None => {
                debug!("Relay carries no auth token");
                return Ok(None);
            }
        };

        if !self.platform.app_healthy(name).await? {
            debug!("Platform reports the relay as unhealthy");
            return Ok(None);
        }

        let client = RelayClient::discover(&snapshot.url).await?;
        match client.info(&token).await {
            Ok(info) if info.version == RELAY_VERSION => Ok(Some(ReadyRelay { token, client })),
            Ok(info) => {
                debug!(
                    "Relay reports version {}, expected {}",
                    info.version, RELAY_VERSION
                );
                Ok(None)
            }
            Err(e) => {
                debug!("Relay health probe failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Create, upload, start and health-gate a fresh relay bound to the
    /// target service. A failure after creation deletes the app again so no
    /// half-configured relay is left behind.
    async fn provision(&self, service: &ServiceInstance) -> Result<ReadyRelay, TunnelError> {
        if !self.config.payload.exists() {
            return Err(TunnelError::PayloadMissing(
                self.config.payload.display().to_string(),
            ));
        }

        let name = &self.config.app_name;
        let token = AuthToken::generate();
        let manifest = AppManifest {
            name: name.clone(),
            framework: self.config.framework.clone(),
            url: self.random_relay_url(),
            instances: 1,
            memory_mb: self.config.memory_mb,
            env: vec![format!("{}={}", RELAY_AUTH_ENV, token.as_str())],
            services: vec![service.name.clone()],
        };

        info!("Provisioning relay application at {}", manifest.url);
        self.platform.create_app(&manifest).await?;

        if let Err(e) = self.upload_and_start().await {
            if let Err(cleanup) = self.platform.delete_app(name).await {
                warn!("Failed to clean up relay after provisioning error: {}", cleanup);
            }
            return Err(e);
        }

        let snapshot = self.platform.app_snapshot(name).await?;
        let client = RelayClient::discover(&snapshot.url).await?;
        Ok(ReadyRelay { token, client })
    }

    async fn upload_and_start(&self) -> Result<(), TunnelError> {
        let name = &self.config.app_name;

        self.platform.upload_app(name, &self.config.payload).await?;
        self.platform.start_app(name).await?;
        self.wait_until_healthy().await
    }

    /// Poll health after a start or restart, up to the configured budget.
    async fn wait_until_healthy(&self) -> Result<(), TunnelError> {
        let name = &self.config.app_name;
        for _ in 0..self.config.start_poll_limit {
            if self.platform.app_healthy(name).await? {
                return Ok(());
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        Err(TunnelError::RelayStartTimeout)
    }

    /// `relay-<hex>.<target minus its first label>`, e.g.
    /// `relay-9f21ac.platform.example.com` for `api.platform.example.com`.
    fn random_relay_url(&self) -> String {
        let target = self.platform.target();
        let base = target.split_once('.').map(|(_, rest)| rest).unwrap_or(target);
        let random = Uuid::new_v4().simple().to_string();
        format!("relay-{}.{}", &random[..6], base)
    }
}
