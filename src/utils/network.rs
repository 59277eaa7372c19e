//! Network utilities
//!
//! Listener selection over a list of candidate ports and best-effort
//! discovery of the LAN address to print for clients.

use log::{debug, info};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tokio::net::TcpListener;

use crate::error::ServerError;

/// Bind the first candidate port that is free on `bind_address`.
pub async fn bind_first_available(
    bind_address: &str,
    ports: &[u16],
) -> Result<TcpListener, ServerError> {
    for &port in ports {
        match TcpListener::bind((bind_address, port)).await {
            Ok(listener) => {
                info!("Bound to {bind_address}:{port}");
                return Ok(listener);
            }
            Err(e) => debug!("Port {port} unavailable on {bind_address}: {e}"),
        }
    }
    Err(ServerError::NoAvailablePort(ports.to_vec()))
}

/// Address other machines on the network can reach us on. Connecting a UDP
/// socket sends nothing; it only asks the OS which interface would route.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
