//! Network helpers: free-port scan, local address detection, access URLs

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};

use tracing::{debug, warn};

use crate::error::ServerError;

/// How many sequential ports a scan probes by default
pub const DEFAULT_MAX_SEARCH: u16 = 1000;

/// Check if a port is free by binding to it.
/// The listener is dropped immediately, which releases the port.
pub fn is_port_free(port: u16, host: IpAddr) -> bool {
    match TcpListener::bind((host, port)) {
        Ok(listener) => listener.local_addr().is_ok(),
        Err(e) => {
            debug!(port, %host, "port unavailable: {e}");
            false
        }
    }
}

/// Sequential candidates starting at `start`, never past 65535 and never 0
pub fn candidate_ports(start: u16, max_search: u16) -> impl Iterator<Item = u16> {
    (start.max(1)..=u16::MAX).take(usize::from(max_search))
}

/// Probe `start`, `start + 1`, ... and return the first free port
pub fn find_free_port(start: u16, host: IpAddr, max_search: u16) -> Result<u16, ServerError> {
    let mut last = start.max(1);
    for port in candidate_ports(start, max_search) {
        if is_port_free(port, host) {
            return Ok(port);
        }
        last = port;
    }
    Err(ServerError::NoFreePort {
        start: start.max(1),
        end: last,
    })
}

/// Use `preferred` when free, otherwise scan upward from the port after it
pub fn select_port(preferred: u16, host: IpAddr, max_search: u16) -> Result<u16, ServerError> {
    if preferred != 0 && is_port_free(preferred, host) {
        return Ok(preferred);
    }
    // a busy preferred port is never probed again
    let next = preferred.checked_add(1).ok_or(ServerError::NoFreePort {
        start: preferred,
        end: preferred,
    })?;
    let port = find_free_port(next, host, max_search)?;
    debug!(preferred, port, "preferred port busy, selected another");
    Ok(port)
}

/// Address other devices on the LAN can reach us at.
/// Connecting a UDP socket sends nothing; it only picks the outbound interface.
pub fn find_local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };
    probe().unwrap_or_else(|e| {
        warn!("could not detect local ip, falling back to loopback: {e}");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    })
}

/// Host to put in the URL for a server bound to `bind`
pub fn advertised_host(bind: IpAddr) -> IpAddr {
    if bind.is_unspecified() {
        find_local_ip()
    } else {
        bind
    }
}

/// `http://<host>:<port>/`, with IPv6 hosts bracketed
pub fn access_url(host: IpAddr, port: u16) -> String {
    format!("http://{}/", SocketAddr::new(host, port))
}
