use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use host_recon::config::ScanConfig;
use host_recon::logging;
use host_recon::ports;
use host_recon::report::{Reporter, ReporterOptions};
use host_recon::screenshot::NoScreenshots;
use host_recon::{ScanRequest, Scanner};

/// Command-line options for a single host scan.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "host-recon",
    version,
    about = "Safe-by-default host reconnaissance: TCP probing, security headers, TLS expiry, risk score.",
    after_help = "Only scan systems you own or have explicit permission to test."
)]
struct Cli {
    /// Hostname, IP, or URL (e.g. 192.168.1.100 or http://localhost:8080).
    #[arg(short, long)]
    target: String,

    /// Comma-separated ports or ranges (e.g. 21,22,80,8000-8010), or `common`.
    #[arg(short, long)]
    ports: Option<String>,

    /// Path to ports list file (one port or range per line, `#` comments).
    #[arg(long = "ports-file", conflicts_with = "ports")]
    ports_file: Option<PathBuf>,

    /// Connect timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,

    /// Max concurrent TCP probes.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Plain text output instead of tables.
    #[arg(long, default_value_t = false)]
    plain: bool,

    /// Capture screenshots of HTTP services (needs a headless Chromium on PATH).
    #[arg(long, default_value_t = false)]
    screenshot: bool,

    /// Allow scanning targets outside the internal networks.
    #[arg(long = "allow-external", default_value_t = false)]
    allow_external: bool,

    /// Debug-level logging on stderr.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// JSON configuration file (timeouts, weights, internal networks, ...).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::initialize_logging(cli.verbose)?;

    let mut cfg = match cli.config.as_deref() {
        Some(path) => ScanConfig::from_path(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => ScanConfig::default(),
    };
    if let Some(secs) = cli.timeout {
        let timeout = Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| !d.is_zero())
            .with_context(|| format!("invalid timeout: {secs}"))?;
        cfg.connect_timeout_ms = timeout.as_millis().max(1) as u64;
    }
    if let Some(workers) = cli.workers {
        cfg.concurrency = workers;
    }
    cfg.validate()?;

    let port_list = match (&cli.ports, &cli.ports_file) {
        (Some(spec), _) if spec.trim() == "common" => ports::common_ports(),
        (Some(spec), _) => ports::parse_ports_str(spec).context("invalid --ports")?,
        (None, Some(path)) => ports::load_ports_from_path(path)?,
        (None, None) => cfg.default_ports.clone(),
    };
    if port_list.is_empty() {
        bail!("no ports to scan");
    }

    eprintln!("host-recon configuration:");
    eprintln!("  target       : {}", cli.target);
    eprintln!("  ports        : {}", join_ports(&port_list));
    eprintln!("  concurrency  : {}", cfg.concurrency);
    eprintln!("  timeout_ms   : {}", cfg.connect_timeout_ms);
    eprintln!("  screenshots  : {}", if cli.screenshot { "enabled" } else { "disabled" });
    eprintln!("Reminder: only scan systems you own or have explicit permission to test.");

    let mut scanner = Scanner::from_config(&cfg)?;
    if !cli.screenshot {
        scanner = scanner.with_screenshot_capturer(Arc::new(NoScreenshots));
    }
    let mut request = ScanRequest::new(cli.target.clone(), port_list, &cfg);
    request.allow_external = cli.allow_external;
    request.enable_screenshots = cli.screenshot;

    // Ctrl-C stops dispatching new probes; the partial report is still printed.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let report = scanner.run_scan_with_cancel(&request, cancel).await?;
    let reporter = Reporter::new(ReporterOptions { tables: !cli.plain });
    print!("{}", reporter.render(&report));

    if let Some(path) = cli.save.as_deref() {
        reporter.write_json(path, &report)?;
        eprintln!("Report saved to {}", path.display());
    }

    if report.refused {
        return Ok(ExitCode::from(2));
    }

    if report.interrupted {
        eprintln!("Scan interrupted by user");
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

fn join_ports(ports: &[u16]) -> String {
    const SHOWN: usize = 20;
    let mut s: Vec<String> = ports.iter().take(SHOWN).map(u16::to_string).collect();
    if ports.len() > SHOWN {
        s.push(format!("... ({} total)", ports.len()));
    }
    s.join(",")
}
