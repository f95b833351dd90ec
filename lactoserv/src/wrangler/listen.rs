//! Resolves a `Listen` config into an actual bound socket: either a
//! `{interface, port}` pair or an inherited file descriptor (spec.md §6
//! "Network").

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::TcpListener;

use crate::config::Listen;
use crate::error::ResourceError;

/// `*` and empty string mean "all IPv4 interfaces"; `::` means "all IPv6
/// interfaces"; a literal IP is parsed directly; anything else is resolved
/// as a hostname via the system resolver (spec.md §6: `interface` is "a
/// hostname, IPv4 literal, IPv6 literal, ... `*` ..., or `::`"), taking the
/// first address `tokio::net::lookup_host` returns.
async fn resolve_interface(interface: &str) -> Result<IpAddr, ResourceError> {
    match interface {
        "*" | "" => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        "::" => Ok(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        other => {
            if let Ok(ip) = other.parse::<IpAddr>() {
                return Ok(ip);
            }
            tokio::net::lookup_host((other, 0))
                .await
                .ok()
                .and_then(|mut addrs| addrs.next())
                .map(|addr| addr.ip())
                .ok_or_else(|| ResourceError::Bind {
                    interface: other.to_string(),
                    port: 0,
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "hostname did not resolve to any address"),
                })
        }
    }
}

pub async fn bind(listen: &Listen) -> Result<TcpListener, ResourceError> {
    match listen {
        Listen::Address { interface, port } => {
            let ip = resolve_interface(interface).await?;
            let addr = SocketAddr::new(ip, *port);
            TcpListener::bind(addr)
                .await
                .map_err(|source| ResourceError::Bind { interface: interface.clone(), port: *port, source })
        }
        Listen::Fd { fd } => bind_from_fd(*fd),
    }
}

#[cfg(unix)]
fn bind_from_fd(fd: i32) -> Result<TcpListener, ResourceError> {
    use std::os::unix::io::FromRawFd;

    // SAFETY: the caller configured this fd specifically for inheritance
    // (e.g. via systemd socket activation); ownership passes to the
    // `std::net::TcpListener` we build it into.
    let std_listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
    std_listener.set_nonblocking(true).map_err(|source| ResourceError::Bind { interface: format!("fd:{fd}"), port: 0, source })?;
    TcpListener::from_std(std_listener)
        .map_err(|source| ResourceError::Bind { interface: format!("fd:{fd}"), port: 0, source })
}

#[cfg(not(unix))]
fn bind_from_fd(fd: i32) -> Result<TcpListener, ResourceError> {
    Err(ResourceError::Bind {
        interface: format!("fd:{fd}"),
        port: 0,
        source: std::io::Error::new(std::io::ErrorKind::Unsupported, "fd inheritance requires unix"),
    })
}
