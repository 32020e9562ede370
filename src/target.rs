use std::net::IpAddr;

use url::Url;

use crate::error::{Result, ScanError};
use crate::types::ScanTarget;

/// Reduce raw user input (host, IP, or URL) to a bare host name.
///
/// `http://localhost:8080/path` becomes `localhost`; `[::1]` becomes `::1`.
pub fn normalize_target(raw: &str) -> Result<String> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(invalid(raw, "empty target"));
    }

    if input.contains("://") {
        let url = Url::parse(input).map_err(|e| invalid(raw, &e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid(raw, "URL has no host"))?;
        return Ok(strip_brackets(host).to_string());
    }

    let host = strip_brackets(input);
    if host.parse::<IpAddr>().is_ok() {
        return Ok(host.to_string());
    }
    // host:port without a scheme
    let host = match host.rsplit_once(':') {
        Some((h, port)) if port.parse::<u16>().is_ok() && !h.contains(':') => h,
        _ => host,
    };
    if host.is_empty() || host.contains('/') || host.contains(char::is_whitespace) {
        return Err(invalid(raw, "not a host name or address"));
    }
    Ok(host.to_string())
}

/// Normalize and resolve the target, preferring an IPv4 address when the name has one.
pub async fn resolve_target(raw: &str) -> Result<ScanTarget> {
    let host = normalize_target(raw)?;
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(ScanTarget { host, addr });
    }

    let addrs = tokio::net::lookup_host((host.clone(), 0))
        .await
        .map_err(|source| ScanError::Resolve {
            host: host.clone(),
            source,
        })?;
    let addr = prefer_ipv4(addrs.map(|sa| sa.ip()))
        .ok_or_else(|| ScanError::NoAddress { host: host.clone() })?;
    Ok(ScanTarget { host, addr })
}

/// First IPv4 address, else the first address of any family.
pub fn prefer_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

fn strip_brackets(s: &str) -> &str {
    s.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(s)
}

fn invalid(input: &str, reason: &str) -> ScanError {
    ScanError::InvalidTarget {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
