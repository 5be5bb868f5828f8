//! Local port reservation
//!
//! A port is probed by connecting to it: an accepted connection means
//! something is already listening there, a refused one means it is free.

use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Candidate ports tried before falling back to an OS-assigned one.
pub const PORT_SPAN: u16 = 10;

pub struct PortAllocator;

impl PortAllocator {
    /// Reserve a free local TCP port, preferring `requested` and its
    /// neighbors, falling back to an ephemeral port when the whole span
    /// is occupied.
    pub async fn reserve(requested: u16) -> std::io::Result<u16> {
        let mut candidate = requested;
        for _ in 0..PORT_SPAN {
            match TcpStream::connect(("127.0.0.1", candidate)).await {
                Ok(_) => {
                    debug!("Port {} is occupied", candidate);
                    candidate = match candidate.checked_add(1) {
                        Some(next) => next,
                        None => break,
                    };
                }
                Err(_) => return Ok(candidate),
            }
        }

        Self::ephemeral().await
    }

    /// Ask the OS for an unused port by binding to port 0 and reading back
    /// the assignment.
    async fn ephemeral() -> std::io::Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let port = listener.local_addr()?.port();
        debug!("Falling back to ephemeral port {}", port);
        Ok(port)
    }
}
