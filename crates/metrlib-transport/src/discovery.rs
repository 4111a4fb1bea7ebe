//! LAN discovery for instruments built on the Microchip TCP/IP stack.
//!
//! Instruments using the Microchip stack (the Holzworth HS9000 family among
//! them) answer a fixed ASCII broadcast on UDP port 30303. Each reply is a
//! short ASCII datagram whose first comma-separated field identifies the
//! device; the instrument's IP address is the datagram's source.
//!
//! ```no_run
//! use metrlib_transport::discovery;
//! use std::time::Duration;
//!
//! # async fn example() -> metrlib_core::Result<()> {
//! for device in discovery::discover(Duration::from_secs(2)).await? {
//!     println!("{} at {}", device.id, device.ip);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use metrlib_core::error::{Error, Result};
use metrlib_core::registry::MICROCHIP_DISCOVERY_PORT;
use tokio::net::UdpSocket;

/// The query datagram every Microchip-stack device answers.
pub const DISCOVERY_MESSAGE: &[u8] = b"Discovery: Who is out there!";

/// A device that answered the discovery broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Source address of the reply.
    pub ip: IpAddr,
    /// First comma-separated field of the reply (host name or model).
    /// Empty for non-ASCII replies.
    pub id: String,
    /// The full reply text, trimmed.
    pub reply: String,
}

/// Broadcast on the local network and collect replies for `timeout`.
pub async fn discover(timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
    let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), MICROCHIP_DISCOVERY_PORT);
    discover_on(target, timeout).await
}

/// Send the discovery query to `target` and collect replies for `timeout`.
///
/// Devices are deduplicated by source IP and returned sorted by address.
/// Our own query echoed back by the network is ignored.
pub async fn discover_on(target: SocketAddr, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
    let bind_addr: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
        Error::Transport(format!("failed to bind discovery socket: {e}"))
    })?;
    socket
        .set_broadcast(true)
        .map_err(|e| Error::Transport(format!("failed to enable broadcast: {e}")))?;

    socket
        .send_to(DISCOVERY_MESSAGE, target)
        .await
        .map_err(|e| Error::Transport(format!("failed to send discovery to {target}: {e}")))?;
    tracing::debug!(target = %target, "Sent discovery broadcast");

    let mut devices: BTreeMap<IpAddr, DiscoveredDevice> = BTreeMap::new();
    let mut buf = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, src))) => {
                let Some(device) = parse_reply(&buf[..n], src.ip()) else {
                    continue;
                };
                tracing::debug!(ip = %device.ip, id = %device.id, "Discovered instrument");
                devices.entry(device.ip).or_insert(device);
            }
            Ok(Err(e)) => {
                tracing::trace!(error = %e, "Discovery recv error");
            }
            Err(_) => break,
        }
    }

    tracing::debug!(count = devices.len(), "Discovery complete");
    Ok(devices.into_values().collect())
}

/// Interpret one reply datagram. Returns `None` for our own echoed query.
fn parse_reply(data: &[u8], src: IpAddr) -> Option<DiscoveredDevice> {
    match std::str::from_utf8(data) {
        Ok(text) => {
            let reply = text.trim();
            if reply.as_bytes() == DISCOVERY_MESSAGE {
                return None;
            }
            let id = reply
                .split(',')
                .next()
                .map(|f| f.trim().to_string())
                .unwrap_or_default();
            Some(DiscoveredDevice {
                ip: src,
                id,
                reply: reply.to_string(),
            })
        }
        Err(_) => Some(DiscoveredDevice {
            ip: src,
            id: String::new(),
            reply: String::new(),
        }),
    }
}
