//! Tunnel orchestration
//!
//! The single entry point the CLI drives: reserve a local port, get the
//! relay ready, resolve the backend's connection parameters, start the
//! proxy session.

use crate::lifecycle::{RelayConfig, RelayLifecycleManager};
use crate::port::PortAllocator;
use crate::session::TunnelSession;
use crate::TunnelError;
use porthole_platform::{PlatformClient, ServiceInstance};
use porthole_relay::{resolve, ConnectionInfo, RelayError, TunnelProxy};
use std::sync::Arc;
use tracing::{error, info};

pub struct TunnelOrchestrator {
    relay: RelayLifecycleManager,
    session: Option<TunnelSession>,
}

impl TunnelOrchestrator {
    pub fn new(platform: Arc<dyn PlatformClient>, config: RelayConfig) -> Self {
        Self {
            relay: RelayLifecycleManager::new(platform, config),
            session: None,
        }
    }

    /// Open a tunnel to `service`, preferring `requested_port` locally.
    ///
    /// Returns the normalized connection info and the local port actually
    /// bound, which may differ from the requested one.
    pub async fn open(
        &mut self,
        service: &ServiceInstance,
        requested_port: u16,
    ) -> Result<(ConnectionInfo, u16), TunnelError> {
        let local_port = PortAllocator::reserve(requested_port).await?;
        info!("Reserved local port {}", local_port);

        let ready = self.relay.ensure_ready(service).await?;
        let info = resolve(&ready.client, service, &ready.token).await?;

        // resolve() validated both fields; re-surface the same error rather
        // than panic if that invariant ever breaks.
        let dst_host = info
            .hostname()
            .ok_or_else(|| missing_field("hostname", service))?
            .to_string();
        let dst_port = info.port().ok_or_else(|| missing_field("port", service))?;

        let proxy = TunnelProxy::new(ready.client, ready.token, local_port, dst_host, dst_port);
        let mut session = TunnelSession::new(local_port);
        session.start(async move {
            if let Err(e) = proxy.run().await {
                error!("Tunnel proxy ended with error: {}", e);
            }
        });
        self.session = Some(session);

        Ok((info, local_port))
    }

    /// Block until the local listener accepts connections.
    pub async fn wait_until_reachable(&self) -> Result<(), TunnelError> {
        match &self.session {
            Some(session) => session.wait_until_reachable().await,
            None => Err(TunnelError::NotStarted),
        }
    }

    /// Block until the proxy session terminates.
    pub async fn wait_until_ended(&mut self) -> Result<(), TunnelError> {
        match &mut self.session {
            Some(session) => session.wait_until_ended().await,
            None => Err(TunnelError::NotStarted),
        }
    }
}

fn missing_field(field: &str, service: &ServiceInstance) -> TunnelError {
    TunnelError::Relay(RelayError::MissingField {
        field: field.to_string(),
        service: service.name.clone(),
    })
}
