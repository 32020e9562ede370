use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use host_recon::config::ScanConfig;
use host_recon::probe::{PortProber, TcpProber};
use host_recon::types::{PortState, ScanTarget};
use host_recon::{ScanRequest, Scanner};

const CONNECT: Duration = Duration::from_millis(500);
const READ: Duration = Duration::from_millis(200);

fn loopback() -> ScanTarget {
    ScanTarget {
        host: "127.0.0.1".to_string(),
        addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn refused_connection_is_closed() {
    let port = free_port().await;
    let result = TcpProber.probe(&loopback(), port, CONNECT, READ).await;
    assert_eq!(result.state, PortState::Closed);
    assert!(result.banner.is_empty());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn silent_listener_is_open_with_empty_banner() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let result = TcpProber.probe(&loopback(), port, CONNECT, READ).await;
    assert_eq!(result.state, PortState::Open);
    assert_eq!(result.banner, "");
    assert!(result.error.is_none());
}

#[tokio::test]
async fn ssh_banner_identifies_service() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"SSH-2.0-OpenSSH_8.9p1 Ubuntu-3\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let result = TcpProber.probe(&loopback(), port, CONNECT, READ).await;
    assert_eq!(result.state, PortState::Open);
    assert_eq!(result.banner, "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3");
    assert_eq!(result.service, "ssh");
}

#[tokio::test]
async fn loopback_scan_mixes_open_and_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });
    let closed = free_port().await;

    let cfg = ScanConfig { read_timeout_ms: 100, ..ScanConfig::default() };
    let scanner = Scanner::from_config(&cfg).unwrap();
    let report = scanner
        .run_scan(&ScanRequest::new("http://127.0.0.1:8080/", vec![open, closed], &cfg))
        .await
        .unwrap();

    assert_eq!(report.target, "127.0.0.1");
    assert_eq!(report.ports.len(), 2);
    assert!(report.ports.iter().any(|p| p.port == open && p.is_open()));
    assert!(report.ports.iter().any(|p| p.port == closed && p.state == PortState::Closed));
    assert!(report.http_headers.is_empty());
    assert!(report.tls_cert.is_none());
}
