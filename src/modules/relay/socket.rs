//! UDP socket construction with buffer tuning.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Bind a non-blocking UDP socket with the requested receive buffer.
///
/// A kernel refusing the buffer size is logged, not fatal.
///
/// # Errors
///
/// Returns an error if the socket cannot be created or bound.
pub fn bind_udp(addr: SocketAddr, recv_buffer_size: usize) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    if recv_buffer_size > 0 {
        if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
            warn!(error = %e, requested = recv_buffer_size, "Failed to set receive buffer size");
        }
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    if let Ok(actual) = socket.recv_buffer_size() {
        debug!(address = %addr, requested = recv_buffer_size, actual, "UDP socket bound");
    }

    UdpSocket::from_std(socket.into())
}

/// Ephemeral wildcard address in the same family as `target`.
#[must_use]
pub fn ephemeral_for(target: SocketAddr) -> SocketAddr {
    let ip = match target {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}
