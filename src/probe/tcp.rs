//! TCP connect probe.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;

use super::PortState;

/// Try to open a TCP connection to `address:port`.
///
/// An explicit refusal is `Closed`; silence or any other failure is
/// `FilteredOrTimeout`. The connection is dropped as soon as it is made.
pub async fn probe_tcp_port(address: IpAddr, port: u16, timeout: Duration) -> PortState {
    let addr = SocketAddr::new(address, port);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => PortState::Open,
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => PortState::Closed,
        Ok(Err(e)) => {
            tracing::trace!("TCP probe {}: {}", addr, e);
            PortState::FilteredOrTimeout
        }
        Err(_) => PortState::FilteredOrTimeout,
    }
}
