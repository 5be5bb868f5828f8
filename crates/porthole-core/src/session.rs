//! Tunnel session lifecycle
//!
//! Owns the background proxy task and the two wait primitives callers block
//! on. The session aborts its task on drop, so no proxy outlives the session
//! that started it.

use crate::TunnelError;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

/// Connect probes against the local port before giving up.
pub const REACHABILITY_ATTEMPTS: u32 = 10;

const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// One live proxying session per orchestrated tunnel.
pub struct TunnelSession {
    local_port: u16,
    probe_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl TunnelSession {
    pub fn new(local_port: u16) -> Self {
        Self {
            local_port,
            probe_interval: PROBE_INTERVAL,
            handle: None,
        }
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn started(&self) -> bool {
        self.handle.is_some()
    }

    /// Launch the background proxy task.
    pub fn start(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.handle = Some(tokio::spawn(task));
    }

    /// Block until the local listener accepts connections.
    ///
    /// The proxy task binds its listener asynchronously; this polls a probe
    /// connection against the local port until it succeeds or the attempt
    /// budget runs out.
    pub async fn wait_until_reachable(&self) -> Result<(), TunnelError> {
        for attempt in 1..=REACHABILITY_ATTEMPTS {
            match TcpStream::connect(("127.0.0.1", self.local_port)).await {
                Ok(stream) => {
                    drop(stream);
                    return Ok(());
                }
                Err(_) => {
                    debug!(
                        "Local tunnel not reachable yet (attempt {}/{})",
                        attempt, REACHABILITY_ATTEMPTS
                    );
                    tokio::time::sleep(self.probe_interval).await;
                }
            }
        }

        Err(TunnelError::LocalUnreachable)
    }

    /// Block until the proxy task terminates. Calling this before `start`
    /// is a usage error, never an indefinite wait.
    ///
    /// Cancellation-safe: the handle stays owned by the session until the
    /// join actually completes, so dropping this future mid-wait (ctrl-c
    /// racing the session) leaves the abort-on-drop teardown intact.
    pub async fn wait_until_ended(&mut self) -> Result<(), TunnelError> {
        match self.handle.as_mut() {
            // An aborted task joins with a cancellation error; both
            // outcomes mean the session has ended.
            Some(handle) => {
                let _ = handle.await;
                self.handle = None;
                Ok(())
            }
            None => Err(TunnelError::NotStarted),
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
