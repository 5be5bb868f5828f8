//! Local data plane
//!
//! Bridges a local TCP listener to the relay's HTTP tunnel endpoints. Each
//! accepted connection gets its own relay tunnel: outbound bytes are pushed
//! as sequenced PUTs, inbound bytes arrive from sequenced long-poll GETs.

use crate::{AuthToken, RelayClient, RelayError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const READ_BUF_SIZE: usize = 16 * 1024;

/// Local proxy for one tunnel session.
///
/// `run` owns the listener for the lifetime of the session; the session
/// layer aborts the task to tear the proxy down.
#[derive(Debug, Clone)]
pub struct TunnelProxy {
    client: RelayClient,
    token: AuthToken,
    local_port: u16,
    dst_host: String,
    dst_port: u16,
}

impl TunnelProxy {
    pub fn new(
        client: RelayClient,
        token: AuthToken,
        local_port: u16,
        dst_host: String,
        dst_port: u16,
    ) -> Self {
        Self {
            client,
            token,
            local_port,
            dst_host,
            dst_port,
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Accept loop. Runs until the owning task is aborted.
    pub async fn run(self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(("127.0.0.1", self.local_port)).await?;
        info!(
            "Tunnel to {}:{} listening on 127.0.0.1:{}",
            self.dst_host, self.dst_port, self.local_port
        );

        loop {
            let (socket, peer_addr) = listener.accept().await?;
            debug!("Accepted local connection from {}", peer_addr);

            let proxy = self.clone();
            tokio::spawn(async move {
                match proxy.handle_connection(socket).await {
                    Ok(()) => debug!("Connection from {} closed", peer_addr),
                    Err(e) => warn!("Connection from {} ended with error: {}", peer_addr, e),
                }
            });
        }
    }

    async fn handle_connection(&self, socket: TcpStream) -> Result<(), RelayError> {
        let tunnel = self
            .client
            .create_tunnel(&self.token, &self.dst_host, self.dst_port)
            .await?;
        debug!("Relay allocated tunnel {}", tunnel.path);

        let (mut read_half, mut write_half) = socket.into_split();

        let outbound = {
            let client = self.client.clone();
            let token = self.token.clone();
            let path_in = tunnel.path_in.clone();
            async move {
                let mut buf = vec![0u8; READ_BUF_SIZE];
                let mut seq: u64 = 1;
                loop {
                    let n = read_half.read(&mut buf).await?;
                    if n == 0 {
                        return Ok(());
                    }
                    client
                        .send_chunk(&path_in, seq, buf[..n].to_vec(), &token)
                        .await?;
                    seq += 1;
                }
            }
        };

        let inbound = {
            let client = self.client.clone();
            let token = self.token.clone();
            let path_out = tunnel.path_out.clone();
            async move {
                let mut seq: u64 = 1;
                loop {
                    match client.recv_chunk(&path_out, seq, &token).await? {
                        Some(chunk) => {
                            write_half.write_all(&chunk).await?;
                            seq += 1;
                        }
                        None => return Ok(()),
                    }
                }
            }
        };

        // Whichever side finishes first ends the connection; the other pump
        // is dropped mid-poll.
        let result: Result<(), RelayError> = tokio::select! {
            r = outbound => r,
            r = inbound => r,
        };

        if let Err(e) = self.client.close_tunnel(&tunnel.path, &self.token).await {
            debug!("Failed to release tunnel {}: {}", tunnel.path, e);
        }

        match result {
            // The relay dropping its side is a normal close, not a fault.
            Err(RelayError::TunnelClosed) => Ok(()),
            other => other,
        }
    }
}
