use std::collections::BTreeMap;

use host_recon::analyzer::{Analyzer, FindingKind, RiskBand};
use host_recon::config::{RiskWeights, ScanConfig};
use host_recon::http::SECURITY_HEADERS;
use host_recon::tls::classify_expiry;
use host_recon::types::{HttpHeaderResult, PortResult, ScanReport, TlsCertResult};

fn analyzer() -> Analyzer {
    let cfg = ScanConfig::default();
    Analyzer::new(cfg.weights, cfg.risky_services)
}

fn https_result(present: &[&str]) -> HttpHeaderResult {
    let headers_found: BTreeMap<String, String> = present
        .iter()
        .map(|h| (h.to_string(), "set".to_string()))
        .collect();
    let headers_missing = SECURITY_HEADERS
        .iter()
        .filter(|h| !present.contains(h))
        .map(|h| h.to_string())
        .collect();
    HttpHeaderResult {
        url: "https://127.0.0.1:443".to_string(),
        status_code: Some(200),
        headers_found,
        headers_missing,
        error: None,
    }
}

fn report_with_headers(result: HttpHeaderResult) -> ScanReport {
    let mut report = ScanReport::new("127.0.0.1");
    report.ports.push(PortResult::open(443, "", "https"));
    report.http_headers.insert("https_443".to_string(), result);
    report
}

fn cert_expiring_in(days: i64) -> TlsCertResult {
    let (is_expired, is_near_expiry) = classify_expiry(days);
    TlsCertResult {
        days_until_expiry: Some(days),
        is_expired,
        is_near_expiry,
        ..Default::default()
    }
}

#[test]
fn missing_headers_score_higher_than_complete_set() {
    let a = analyzer();
    let bare = a.analyze(&report_with_headers(https_result(&[])));
    let hardened = a.analyze(&report_with_headers(https_result(&SECURITY_HEADERS)));

    assert!(bare.risk_score > hardened.risk_score);
    assert_eq!(hardened.risk_score, 0);
    assert!(hardened.vulnerabilities.is_empty());
    // six missing headers plus the composite finding
    assert_eq!(bare.vulnerabilities.len(), 7);
}

#[test]
fn each_additional_missing_header_never_lowers_score() {
    let a = analyzer();
    let mut previous = 0;
    for present in (0..=SECURITY_HEADERS.len()).rev() {
        let score = a
            .analyze(&report_with_headers(https_result(&SECURITY_HEADERS[..present])))
            .risk_score;
        assert!(score >= previous, "{present} present: {score} < {previous}");
        previous = score;
    }
}

#[test]
fn hsts_not_flagged_on_plain_http() {
    let a = analyzer();
    let mut result = https_result(&SECURITY_HEADERS[..3]);
    result.url = "http://127.0.0.1:80".to_string();
    let mut report = ScanReport::new("127.0.0.1");
    report.http_headers.insert("http_80".to_string(), result);

    let assessment = a.analyze(&report);
    assert!(!assessment
        .vulnerabilities
        .iter()
        .any(|v| v.contains("Strict-Transport-Security")));
    assert_eq!(assessment.vulnerabilities.len(), 2);
}

#[test]
fn tls_expiry_findings() {
    let a = analyzer();
    let weights = RiskWeights::default();

    let mut report = ScanReport::new("127.0.0.1");
    report.tls_cert = Some(cert_expiring_in(-5));
    let expired = a.analyze(&report);
    assert_eq!(expired.vulnerabilities.len(), 1);
    assert_eq!(expired.vulnerabilities[0], "CRITICAL: TLS certificate expired 5 days ago");
    assert_eq!(u32::from(expired.risk_score), FindingKind::TlsExpired.weight(&weights));

    report.tls_cert = Some(cert_expiring_in(10));
    let near = a.analyze(&report);
    assert_eq!(near.vulnerabilities, vec!["WARNING: TLS certificate expires in 10 days".to_string()]);
    assert_eq!(u32::from(near.risk_score), FindingKind::TlsNearExpiry.weight(&weights));

    report.tls_cert = Some(cert_expiring_in(45));
    let healthy = a.analyze(&report);
    assert!(healthy.vulnerabilities.is_empty());
    assert_eq!(healthy.risk_score, 0);
}

#[test]
fn risky_services_flagged_only_when_open() {
    let a = analyzer();
    let mut report = ScanReport::new("127.0.0.1");
    report.ports.push(PortResult::open(23, "", "telnet"));
    report.ports.push(PortResult::closed(3306, "mysql"));
    report.ports.push(PortResult::open(22, "SSH-2.0-OpenSSH_9.6", "ssh"));

    let assessment = a.analyze(&report);
    assert_eq!(
        assessment.vulnerabilities,
        vec!["Risky service exposed: telnet on port 23".to_string()]
    );
}

#[test]
fn score_is_clamped() {
    let a = analyzer();
    let mut report = report_with_headers(https_result(&[]));
    for (port, service) in [(21, "ftp"), (23, "telnet"), (3306, "mysql"), (3389, "rdp"), (5900, "vnc"), (6379, "redis")] {
        report.ports.push(PortResult::open(port, "", service));
    }
    report.tls_cert = Some(cert_expiring_in(-1));
    assert_eq!(a.analyze(&report).risk_score, 100);
    assert_eq!(RiskBand::from_score(100), RiskBand::High);
}

#[test]
fn analysis_is_deterministic_and_idempotent() {
    let a = analyzer();
    let mut report = report_with_headers(https_result(&["X-Frame-Options"]));
    report.ports.push(PortResult::open(21, "220 (vsFTPd 3.0.5)", "ftp"));
    report.tls_cert = Some(cert_expiring_in(3));

    assert_eq!(a.analyze(&report), a.analyze(&report));

    let once = a.finalize(report);
    let twice = a.finalize(once.clone());
    assert_eq!(once.vulnerabilities, twice.vulnerabilities);
    assert_eq!(once.risk_score, twice.risk_score);
}

#[test]
fn custom_weights_change_score() {
    let cfg = ScanConfig::default();
    let weights = RiskWeights { missing_header: 1, no_security_headers: 0, ..RiskWeights::default() };
    let light = Analyzer::new(weights, cfg.risky_services);
    let score = light.analyze(&report_with_headers(https_result(&[]))).risk_score;
    assert_eq!(score, 6);
}
