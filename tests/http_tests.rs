use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use host_recon::http::{HeaderInspector, ReqwestInspector};
use host_recon::types::{ScanTarget, Scheme};

fn loopback() -> ScanTarget {
    ScanTarget {
        host: "127.0.0.1".to_string(),
        addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

/// Minimal HTTP/1.1 server: `/` redirects to `/landing`, which answers 200
/// with a single security header.
async fn spawn_redirecting_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/");
                let response = if path == "/landing" {
                    "HTTP/1.1 200 OK\r\nX-Frame-Options: DENY\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                } else {
                    "HTTP/1.1 302 Found\r\nLocation: /landing\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}

#[tokio::test]
async fn redirects_are_followed_and_final_status_recorded() {
    let port = spawn_redirecting_server().await;
    let inspector = ReqwestInspector::new(Duration::from_secs(5)).unwrap();

    let result = inspector.inspect(&loopback(), port, Scheme::Http).await;
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.url, format!("http://127.0.0.1:{port}"));
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.headers_found.get("X-Frame-Options").map(String::as_str), Some("DENY"));
    assert_eq!(result.headers_missing.len(), 5);
}

#[tokio::test]
async fn transport_fault_is_recorded_not_raised() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let inspector = ReqwestInspector::new(Duration::from_secs(2)).unwrap();

    let result = inspector.inspect(&loopback(), port, Scheme::Http).await;
    assert_eq!(result.status_code, None);
    assert!(result.headers_found.is_empty());
    let error = result.error.unwrap();
    assert!(error.starts_with(&format!("HTTP check failed for http://127.0.0.1:{port}")), "{error}");
}
