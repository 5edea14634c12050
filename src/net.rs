//! Local address discovery, for display only.

use std::net::{IpAddr, UdpSocket};

/// Address used to pick the outbound interface. No packets are sent.
const PROBE_ADDR: &str = "8.8.8.8:80";

/// Best-effort IP of the interface that routes to the public internet.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(PROBE_ADDR).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
