use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::ports::WEB_PORTS;
use crate::types::{PortResult, ScanTarget};

const BANNER_LIMIT: usize = 1024;

/// A single bounded attempt to connect to one (host, port) pair and classify it.
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(
        &self,
        target: &ScanTarget,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> PortResult;
}

/// TCP connect prober with a passive (or HTTP `HEAD`) banner grab.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl PortProber for TcpProber {
    async fn probe(
        &self,
        target: &ScanTarget,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> PortResult {
        let addr = SocketAddr::new(target.addr, port);
        let start = Instant::now();
        match time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let banner = grab_banner(&mut stream, &target.host, port, read_timeout).await;
                let service = detect_service(port, &banner);
                debug!(port, latency_ms, service = %service, "port open");
                PortResult::open(port, banner, service)
            }
            Ok(Err(e)) if is_unreachable(&e) => {
                debug!(port, error = %e, "port closed");
                PortResult::closed(port, service_for_port(port))
            }
            Ok(Err(e)) => {
                debug!(port, error = %e, "probe failed");
                PortResult::fault(port, e.to_string())
            }
            Err(_) => {
                // No answer within the connect timeout: filtered or unreachable.
                debug!(port, "connect timed out");
                PortResult::closed(port, service_for_port(port))
            }
        }
    }
}

fn is_unreachable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

/// Best-effort banner read. Any timeout or I/O error yields an empty banner.
async fn grab_banner(stream: &mut TcpStream, host: &str, port: u16, read_timeout: Duration) -> String {
    if WEB_PORTS.contains(&port) {
        let head = format!("HEAD / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
        if !matches!(
            time::timeout(read_timeout, stream.write_all(head.as_bytes())).await,
            Ok(Ok(()))
        ) {
            return String::new();
        }
    }

    let mut buf = vec![0u8; BANNER_LIMIT];
    match time::timeout(read_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            String::from_utf8_lossy(&buf).trim().to_string()
        }
        _ => String::new(),
    }
}

/// Well-known service name for a port number, or `unknown`.
pub fn service_for_port(port: u16) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        80 | 8080 => "http",
        110 => "pop3",
        143 => "imap",
        443 | 8443 => "https",
        993 => "imaps",
        995 => "pop3s",
        1433 => "mssql",
        3306 => "mysql",
        3389 => "rdp",
        5432 => "postgresql",
        5900 => "vnc",
        6379 => "redis",
        27017 => "mongodb",
        _ => "unknown",
    }
}

/// Banner substrings (lowercase) and the service they identify. First match wins.
const BANNER_RULES: &[(&[&str], &str)] = &[
    (&["apache"], "apache"),
    (&["nginx"], "nginx"),
    (&["microsoft", "iis"], "iis"),
    (&["openssh"], "ssh"),
    (&["proftpd", "vsftpd"], "ftp"),
    (&["http"], "http"),
];

/// Guess a service from the port number, refined by banner content.
pub fn detect_service(port: u16, banner: &str) -> String {
    let lower = banner.to_lowercase();
    BANNER_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, service)| *service)
        .unwrap_or_else(|| service_for_port(port))
        .to_string()
}
