use std::collections::BTreeSet;

use crate::config::RiskWeights;
use crate::http::HSTS;
use crate::types::{HttpHeaderResult, ScanReport};

/// Every kind of finding the analyzer can emit; each maps to one weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    RiskyService,
    MissingHeader,
    NoSecurityHeaders,
    TlsExpired,
    TlsNearExpiry,
}

impl FindingKind {
    pub fn weight(self, weights: &RiskWeights) -> u32 {
        match self {
            FindingKind::RiskyService => weights.risky_service,
            FindingKind::MissingHeader => weights.missing_header,
            FindingKind::NoSecurityHeaders => weights.no_security_headers,
            FindingKind::TlsExpired => weights.tls_expired,
            FindingKind::TlsNearExpiry => weights.tls_near_expiry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    fn new(kind: FindingKind, message: String) -> Self {
        Self { kind, message }
    }
}

/// Analyzer output: ordered human-readable findings plus the clamped score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub vulnerabilities: Vec<String>,
    pub risk_score: u8,
}

/// Applies the fixed rule set to a report. Holds no state besides its configuration.
#[derive(Debug, Clone)]
pub struct Analyzer {
    weights: RiskWeights,
    risky_services: BTreeSet<String>,
}

impl Analyzer {
    pub fn new(weights: RiskWeights, risky_services: BTreeSet<String>) -> Self {
        Self {
            weights,
            risky_services,
        }
    }

    /// Findings in rule order: services (report port order), headers (by key), TLS, composite.
    pub fn findings(&self, report: &ScanReport) -> Vec<Finding> {
        let mut out = Vec::new();

        for port in report.open_ports() {
            if self.risky_services.contains(&port.service.to_lowercase()) {
                out.push(Finding::new(
                    FindingKind::RiskyService,
                    format!(
                        "Risky service exposed: {} on port {}",
                        port.service, port.port
                    ),
                ));
            }
        }

        for result in report.http_headers.values() {
            for header in missing_recommended(result) {
                out.push(Finding::new(
                    FindingKind::MissingHeader,
                    format!("Missing security header {} on {}", header, result.url),
                ));
            }
        }

        if let Some(cert) = &report.tls_cert {
            let days = cert.days_until_expiry;
            let shown = |d: Option<i64>| d.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string());
            if cert.is_expired {
                out.push(Finding::new(
                    FindingKind::TlsExpired,
                    format!("CRITICAL: TLS certificate expired {} days ago", shown(days.map(|d| -d))),
                ));
            } else if cert.is_near_expiry {
                out.push(Finding::new(
                    FindingKind::TlsNearExpiry,
                    format!("WARNING: TLS certificate expires in {} days", shown(days)),
                ));
            }
        }

        if !report.http_headers.is_empty()
            && report.http_headers.values().all(|r| r.headers_found.is_empty())
        {
            out.push(Finding::new(
                FindingKind::NoSecurityHeaders,
                format!(
                    "No security headers set on any of {} HTTP service(s)",
                    report.http_headers.len()
                ),
            ));
        }

        out
    }

    pub fn score(&self, findings: &[Finding]) -> u8 {
        let total: u64 = findings
            .iter()
            .map(|f| u64::from(f.kind.weight(&self.weights)))
            .sum();
        total.min(100) as u8
    }

    pub fn analyze(&self, report: &ScanReport) -> Assessment {
        let findings = self.findings(report);
        Assessment {
            risk_score: self.score(&findings),
            vulnerabilities: findings.into_iter().map(|f| f.message).collect(),
        }
    }

    /// Copy the assessment into the report's derived fields.
    pub fn finalize(&self, mut report: ScanReport) -> ScanReport {
        let assessment = self.analyze(&report);
        report.vulnerabilities = assessment.vulnerabilities;
        report.risk_score = assessment.risk_score;
        report
    }
}

/// Missing headers the analyzer flags. HSTS only counts over HTTPS.
fn missing_recommended(result: &HttpHeaderResult) -> impl Iterator<Item = &str> {
    let https = result.is_https();
    result
        .headers_missing
        .iter()
        .map(String::as_str)
        .filter(move |h| https || *h != HSTS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=24 => RiskBand::Low,
            25..=49 => RiskBand::Medium,
            _ => RiskBand::High,
        }
    }
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskBand::Low => "Low",
            RiskBand::Medium => "Medium",
            RiskBand::High => "High",
        };
        f.write_str(s)
    }
}
