use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use crate::analyzer::RiskBand;
use crate::types::{ScanReport, TlsCertResult};

const PREVIEW: usize = 100;

/// Rendering capabilities, chosen once by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterOptions {
    /// Box-drawn tables instead of indented plain text.
    pub tables: bool,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self { tables: true }
    }
}

/// Projects a finished report into JSON or human-readable text.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    options: ReporterOptions,
}

impl Reporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self { options }
    }

    pub fn to_json(&self, report: &ScanReport) -> Result<String> {
        serde_json::to_string_pretty(report).context("serialize report")
    }

    pub fn write_json(&self, path: &Path, report: &ScanReport) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, report)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
        Ok(())
    }

    pub fn render(&self, report: &ScanReport) -> String {
        if report.refused {
            return format!(
                "Scan of {} refused: target is outside the internal networks. \
                 Re-run with --allow-external only if you have explicit permission.\n",
                report.target
            );
        }
        if self.options.tables {
            render_tables(report)
        } else {
            render_plain(report)
        }
    }
}

fn preview(s: &str) -> String {
    let flat = s.replace('\r', "").replace('\n', " | ");
    if flat.chars().count() > PREVIEW {
        let cut: String = flat.chars().take(PREVIEW).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn cert_status(cert: &TlsCertResult) -> &'static str {
    if cert.is_expired {
        "EXPIRED"
    } else if cert.is_near_expiry {
        "Expires soon"
    } else {
        "Valid"
    }
}

fn name_of(attrs: &std::collections::BTreeMap<String, String>, first: &str, second: &str) -> String {
    attrs
        .get(first)
        .or_else(|| attrs.get(second))
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

fn expiry_text(cert: &TlsCertResult) -> String {
    cert.expiry_timestamp
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn risk_line(report: &ScanReport) -> String {
    format!(
        "{}/100 ({})",
        report.risk_score,
        RiskBand::from_score(report.risk_score)
    )
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn render_tables(report: &ScanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Target: {}", report.target);

    let open: Vec<_> = report.open_ports().collect();
    if open.is_empty() {
        let _ = writeln!(out, "\nNo open ports found.");
    } else {
        let mut table = new_table(vec!["Port", "Service", "State", "Banner"]);
        for p in open {
            table.add_row(vec![
                p.port.to_string(),
                p.service.clone(),
                p.state.to_string(),
                preview(&p.banner),
            ]);
        }
        let _ = writeln!(out, "\nOpen Ports\n{table}");
    }

    if report.http_headers.is_empty() {
        let _ = writeln!(out, "\nNo HTTP services found or accessible.");
    }
    for info in report.http_headers.values() {
        let mut table = new_table(vec!["Header", "Status"]);
        for (header, value) in &info.headers_found {
            table.add_row(vec![header.clone(), format!("Present: {}", preview(value))]);
        }
        for header in &info.headers_missing {
            table.add_row(vec![header.clone(), "Missing".to_string()]);
        }
        let status = info
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "\nHTTP Headers - {} (status {})\n{table}", info.url, status);
    }

    match &report.tls_cert {
        Some(cert) => {
            let mut table = new_table(vec!["Field", "Value"]);
            table.add_row(vec!["Issuer".to_string(), name_of(&cert.issuer, "organizationName", "commonName")]);
            table.add_row(vec!["Subject".to_string(), name_of(&cert.subject, "commonName", "organizationName")]);
            table.add_row(vec!["Expiry".to_string(), expiry_text(cert)]);
            table.add_row(vec![
                "Days until expiry".to_string(),
                cert.days_until_expiry.map(|d| d.to_string()).unwrap_or_default(),
            ]);
            table.add_row(vec!["Status".to_string(), cert_status(cert).to_string()]);
            let _ = writeln!(out, "\nTLS Certificate\n{table}");
        }
        None => {
            let _ = writeln!(out, "\nNo TLS certificate found or HTTPS not available.");
        }
    }

    if report.vulnerabilities.is_empty() {
        let _ = writeln!(out, "\nNo specific vulnerabilities identified.");
    } else {
        let mut table = new_table(vec!["Vulnerability"]);
        for v in &report.vulnerabilities {
            table.add_row(vec![v.clone()]);
        }
        let _ = writeln!(out, "\nIdentified Vulnerabilities\n{table}");
    }

    if !report.screenshots.is_empty() {
        let mut table = new_table(vec!["URL", "File"]);
        for s in &report.screenshots {
            table.add_row(vec![s.url.clone(), s.file_path.clone()]);
        }
        let _ = writeln!(out, "\nScreenshots Captured\n{table}");
    }

    let mut risk = new_table(vec!["Metric", "Value"]);
    risk.add_row(vec!["Risk Score".to_string(), risk_line(report)]);
    let _ = writeln!(out, "\nRisk Assessment\n{risk}");

    if !report.errors.is_empty() {
        let mut table = new_table(vec!["Errors During Scan"]);
        for e in &report.errors {
            table.add_row(vec![e.clone()]);
        }
        let _ = writeln!(out, "\n{table}");
    }
    out
}

fn render_plain(report: &ScanReport) -> String {
    let mut out = String::new();
    let rule = "=".repeat(50);
    let _ = writeln!(out, "\n{rule}\nSCAN RESULTS: {}\n{rule}", report.target);

    let open: Vec<_> = report.open_ports().collect();
    if open.is_empty() {
        let _ = writeln!(out, "\nNo open ports found.");
    } else {
        let _ = writeln!(out, "\nOPEN PORTS:");
        for p in open {
            let _ = writeln!(out, "  Port {} ({}): {}", p.port, p.service, p.state);
            if !p.banner.is_empty() {
                let _ = writeln!(out, "    Banner: {}", preview(&p.banner));
            }
        }
    }

    if report.http_headers.is_empty() {
        let _ = writeln!(out, "\nNo HTTP services found or accessible.");
    } else {
        let _ = writeln!(out, "\nHTTP HEADERS:");
        for info in report.http_headers.values() {
            let status = info
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "  {} (Status: {})", info.url, status);
            for (header, value) in &info.headers_found {
                let _ = writeln!(out, "    [+] {}: {}", header, preview(value));
            }
            for header in &info.headers_missing {
                let _ = writeln!(out, "    [-] {}: Missing", header);
            }
        }
    }

    match &report.tls_cert {
        Some(cert) => {
            let _ = writeln!(out, "\nTLS CERTIFICATE:");
            let _ = writeln!(out, "  Issuer: {}", name_of(&cert.issuer, "organizationName", "commonName"));
            let _ = writeln!(out, "  Subject: {}", name_of(&cert.subject, "commonName", "organizationName"));
            let _ = writeln!(out, "  Expiry: {}", expiry_text(cert));
            if let Some(days) = cert.days_until_expiry {
                let _ = writeln!(out, "  Days until expiry: {days}");
            }
            let _ = writeln!(out, "  Status: {}", cert_status(cert));
        }
        None => {
            let _ = writeln!(out, "\nNo TLS certificate found or HTTPS not available.");
        }
    }

    if report.vulnerabilities.is_empty() {
        let _ = writeln!(out, "\nNo specific vulnerabilities identified.");
    } else {
        let _ = writeln!(out, "\nVULNERABILITIES:");
        for v in &report.vulnerabilities {
            let _ = writeln!(out, "  * {v}");
        }
    }

    if !report.screenshots.is_empty() {
        let _ = writeln!(out, "\nSCREENSHOTS:");
        for s in &report.screenshots {
            let _ = writeln!(out, "  {} -> {}", s.url, s.file_path);
        }
    }

    let _ = writeln!(out, "\nRISK ASSESSMENT:\n  Risk Score: {}", risk_line(report));

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\nERRORS:");
        for e in &report.errors {
            let _ = writeln!(out, "  {e}");
        }
    }
    out
}
