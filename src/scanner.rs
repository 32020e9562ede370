use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::Analyzer;
use crate::config::{ScanConfig, TlsPortPolicy};
use crate::error::{Result, ScanError};
use crate::http::{build_url, HeaderInspector, ReqwestInspector};
use crate::ports::WEB_PORTS;
use crate::probe::{PortProber, TcpProber};
use crate::scope::ScopeGuard;
use crate::screenshot::{ChromiumCapturer, ScreenshotCapturer};
use crate::target::resolve_target;
use crate::tls::{NativeTlsInspector, TlsInspector};
use crate::types::{
    http_key, HttpHeaderResult, PortResult, ScanReport, ScanTarget, Scheme, TlsCertResult,
};

/// Service names that get an HTTP header inspection regardless of port.
const HTTP_SERVICES: [&str; 5] = ["http", "https", "apache", "nginx", "iis"];
const TLS_PORTS: [u16; 2] = [443, 8443];

/// Upper bound on simultaneously open sockets, whatever the caller asks for.
const MAX_CONCURRENCY: usize = 5_000;

/// Parameters of one scan run.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target: String,
    pub ports: Vec<u16>,
    pub connect_timeout: Duration,
    pub concurrency: usize,
    pub allow_external: bool,
    pub enable_screenshots: bool,
}

impl ScanRequest {
    /// Request with timeouts and concurrency taken from `cfg`.
    pub fn new(target: impl Into<String>, ports: Vec<u16>, cfg: &ScanConfig) -> Self {
        Self {
            target: target.into(),
            ports,
            connect_timeout: cfg.connect_timeout(),
            concurrency: cfg.concurrency,
            allow_external: false,
            enable_screenshots: false,
        }
    }
}

/// The scan orchestrator: probes ports, fans out follow-up checks, merges results.
pub struct Scanner {
    prober: Arc<dyn PortProber>,
    http: Arc<dyn HeaderInspector>,
    tls: Arc<dyn TlsInspector>,
    screenshots: Arc<dyn ScreenshotCapturer>,
    analyzer: Analyzer,
    scope: ScopeGuard,
    read_timeout: Duration,
    tls_port: TlsPortPolicy,
}

impl Scanner {
    /// Scanner backed by the real network collaborators.
    pub fn from_config(cfg: &ScanConfig) -> Result<Self> {
        cfg.validate()?;
        let http = ReqwestInspector::new(cfg.http_timeout())
            .map_err(|e| ScanError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            prober: Arc::new(TcpProber),
            http: Arc::new(http),
            tls: Arc::new(NativeTlsInspector::new(cfg.connect_timeout())),
            screenshots: Arc::new(ChromiumCapturer::detect(
                cfg.screenshot_dir.clone(),
                cfg.screenshot_timeout(),
            )),
            analyzer: Analyzer::new(cfg.weights, cfg.risky_services.clone()),
            scope: ScopeGuard::new(cfg.internal_networks.clone()),
            read_timeout: cfg.read_timeout(),
            tls_port: cfg.tls_port,
        })
    }

    pub fn with_prober(mut self, prober: Arc<dyn PortProber>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_header_inspector(mut self, http: Arc<dyn HeaderInspector>) -> Self {
        self.http = http;
        self
    }

    pub fn with_tls_inspector(mut self, tls: Arc<dyn TlsInspector>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_screenshot_capturer(mut self, screenshots: Arc<dyn ScreenshotCapturer>) -> Self {
        self.screenshots = screenshots;
        self
    }

    pub async fn run_scan(&self, req: &ScanRequest) -> Result<ScanReport> {
        self.run_scan_with_cancel(req, CancellationToken::new()).await
    }

    /// Run a full scan. Only target normalization or resolution failures are `Err`;
    /// everything else ends up inside the returned report.
    pub async fn run_scan_with_cancel(
        &self,
        req: &ScanRequest,
        cancel: CancellationToken,
    ) -> Result<ScanReport> {
        let target = resolve_target(&req.target).await?;

        if !self.scope.permits(target.addr, req.allow_external) {
            warn!(target = %target, addr = %target.addr, "external target refused without override");
            return Ok(ScanReport::refusal(target.host));
        }

        info!(
            target = %target,
            addr = %target.addr,
            ports = req.ports.len(),
            concurrency = req.concurrency,
            "scan started"
        );
        let mut report = ScanReport::new(target.host.clone());

        report.ports = self.probe_ports(&target, req, &cancel).await;
        let open = report.open_ports().count();
        info!(probed = report.ports.len(), open, "port probing finished");

        if cancel.is_cancelled() {
            report.interrupted = true;
            report.errors.push(format!(
                "scan interrupted: {} of {} ports probed",
                report.ports.len(),
                req.ports.len()
            ));
            return Ok(self.analyzer.finalize(report));
        }

        let http_plan = select_http_targets(&report.ports);
        let tls_port = select_tls_port(&report.ports, self.tls_port);
        debug!(http = http_plan.len(), tls = ?tls_port, "follow-up checks planned");

        let (http_results, tls_result) = tokio::join!(
            self.inspect_http(&target, &http_plan),
            self.inspect_tls(&target, tls_port)
        );

        let mut pages = Vec::new();
        for (scheme, port, result) in http_results {
            if let Some(err) = result.error.clone() {
                report.errors.push(err);
            } else {
                pages.push((result.url.clone(), port));
                report.http_headers.insert(http_key(scheme, port), result);
            }
        }

        if req.enable_screenshots {
            self.capture_screenshots(&target, &pages, &mut report).await;
        }

        if let Some(cert) = tls_result {
            if let Some(err) = cert.error.clone() {
                report.errors.push(err);
            } else {
                report.tls_cert = Some(cert);
            }
        }

        let report = self.analyzer.finalize(report);
        info!(
            risk_score = report.risk_score,
            findings = report.vulnerabilities.len(),
            errors = report.errors.len(),
            "scan finished"
        );
        Ok(report)
    }

    /// One probe per requested port, at most `concurrency` in flight. Stops
    /// dispatching on cancellation; in-flight probes run to their own timeout.
    async fn probe_ports(
        &self,
        target: &ScanTarget,
        req: &ScanRequest,
        cancel: &CancellationToken,
    ) -> Vec<PortResult> {
        let sem = Arc::new(Semaphore::new(req.concurrency.clamp(1, MAX_CONCURRENCY)));
        let mut set = JoinSet::new();
        let mut dispatched = 0usize;

        for &port in &req.ports {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(dispatched, "probe dispatch cancelled");
                    break;
                }
                permit = Arc::clone(&sem).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            dispatched += 1;

            let prober = Arc::clone(&self.prober);
            let target = target.clone();
            let connect_timeout = req.connect_timeout;
            let read_timeout = self.read_timeout;

            set.spawn(async move {
                let _permit = permit; // keep permit until the probe completes
                // A panicking probe surfaces as a JoinError here instead of unwinding the batch.
                let probe = tokio::spawn(async move {
                    prober.probe(&target, port, connect_timeout, read_timeout).await
                });
                match probe.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(port, error = %e, "probe task failed");
                        PortResult::fault(port, format!("probe task failed: {e}"))
                    }
                }
            });
        }

        // The inner spawn absorbs probe panics, so every worker yields a result.
        let mut results = Vec::with_capacity(dispatched);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "probe worker lost"),
            }
        }
        results
    }

    async fn inspect_http(
        &self,
        target: &ScanTarget,
        plan: &[(u16, Scheme)],
    ) -> Vec<(Scheme, u16, HttpHeaderResult)> {
        let handles: Vec<_> = plan
            .iter()
            .map(|&(port, scheme)| {
                let http = Arc::clone(&self.http);
                let target = target.clone();
                let handle =
                    tokio::spawn(async move { http.inspect(&target, port, scheme).await });
                (port, scheme, handle)
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for (port, scheme, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| {
                let url = build_url(target, port, scheme);
                let msg = format!("HTTP check failed for {url}: {e}");
                HttpHeaderResult::failed(url, msg)
            });
            out.push((scheme, port, result));
        }
        out
    }

    async fn inspect_tls(&self, target: &ScanTarget, port: Option<u16>) -> Option<TlsCertResult> {
        let port = port?;
        let tls = Arc::clone(&self.tls);
        let owned = target.clone();
        let handle = tokio::spawn(async move { tls.inspect(&owned, port).await });
        Some(handle.await.unwrap_or_else(|e| {
            TlsCertResult::failed(format!("TLS certificate check failed: {e}"))
        }))
    }

    /// Best effort: failures are logged and dropped, never reported as errors.
    async fn capture_screenshots(
        &self,
        target: &ScanTarget,
        pages: &[(String, u16)],
        report: &mut ScanReport,
    ) {
        if !self.screenshots.is_available() {
            debug!("screenshot capturer unavailable, skipping");
            return;
        }
        for (url, port) in pages {
            match self.screenshots.capture(&target.host, url, *port).await {
                Ok(Some(shot)) => report.screenshots.push(shot),
                Ok(None) => {}
                Err(e) => debug!(url = %url, error = %e, "screenshot dropped"),
            }
        }
    }
}

/// Open ports that warrant a header inspection, with the scheme to use, ordered by port.
pub fn select_http_targets(ports: &[PortResult]) -> Vec<(u16, Scheme)> {
    let mut plan: Vec<(u16, Scheme)> = ports
        .iter()
        .filter(|p| p.is_open())
        .filter(|p| WEB_PORTS.contains(&p.port) || HTTP_SERVICES.contains(&p.service.as_str()))
        .map(|p| {
            let scheme = if TLS_PORTS.contains(&p.port) || p.service == "https" {
                Scheme::Https
            } else {
                Scheme::Http
            };
            (p.port, scheme)
        })
        .collect();
    plan.sort_unstable();
    plan.dedup();
    plan
}

/// Port for the single TLS check, if any open port is 443 or identified as `https`.
pub fn select_tls_port(ports: &[PortResult], policy: TlsPortPolicy) -> Option<u16> {
    let trigger = ports
        .iter()
        .filter(|p| p.is_open() && (p.port == 443 || p.service == "https"))
        .map(|p| p.port)
        .min()?;
    match policy {
        TlsPortPolicy::Fixed(port) => Some(port),
        TlsPortPolicy::Triggering => Some(trigger),
    }
}
