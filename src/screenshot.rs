use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use ::time::OffsetDateTime;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, info};

use crate::types::ScreenshotResult;

/// Browsers tried, in order, when looking for a headless renderer.
const BROWSER_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    /// Fixed at construction; callers check it before asking for a render.
    fn is_available(&self) -> bool;

    /// Render `url` to an image. `Ok(None)` when nothing was captured.
    async fn capture(&self, host: &str, url: &str, port: u16) -> Result<Option<ScreenshotResult>, String>;
}

/// Capturer used when screenshots are disabled or no renderer exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScreenshots;

#[async_trait]
impl ScreenshotCapturer for NoScreenshots {
    fn is_available(&self) -> bool {
        false
    }

    async fn capture(&self, _host: &str, _url: &str, _port: u16) -> Result<Option<ScreenshotResult>, String> {
        Ok(None)
    }
}

/// Drives a headless Chromium-family browser via `--screenshot`.
#[derive(Debug, Clone)]
pub struct ChromiumCapturer {
    browser: Option<PathBuf>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl ChromiumCapturer {
    /// Looks the browser up on `PATH` once; absence makes the capturer unavailable.
    pub fn detect(output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let browser = find_on_path(&BROWSER_CANDIDATES);
        match &browser {
            Some(path) => debug!(browser = %path.display(), "screenshot renderer found"),
            None => info!("no headless browser on PATH, screenshots disabled"),
        }
        Self {
            browser,
            output_dir: output_dir.into(),
            timeout,
        }
    }

    pub fn with_browser(browser: Option<PathBuf>, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            browser,
            output_dir: output_dir.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ScreenshotCapturer for ChromiumCapturer {
    fn is_available(&self) -> bool {
        self.browser.is_some()
    }

    async fn capture(&self, host: &str, url: &str, port: u16) -> Result<Option<ScreenshotResult>, String> {
        let Some(browser) = &self.browser else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| format!("create {}: {e}", self.output_dir.display()))?;

        let now = OffsetDateTime::now_utc();
        let path = self.output_dir.join(screenshot_file_name(host, port, now));

        let mut cmd = Command::new(browser);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--ignore-certificate-errors")
            .arg("--hide-scrollbars")
            .arg("--window-size=1280,800")
            .arg(format!("--screenshot={}", path.display()))
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let status = match time::timeout(self.timeout, cmd.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(format!("launch {}: {e}", browser.display())),
            Err(_) => return Err(format!("render of {url} timed out")),
        };
        if !status.success() || !path.exists() {
            return Err(format!("renderer exited with {status} for {url}"));
        }

        info!(url, file = %path.display(), "screenshot saved");
        Ok(Some(ScreenshotResult {
            url: url.to_string(),
            file_path: path.display().to_string(),
            timestamp: now,
        }))
    }
}

/// `<host>_port_<port>_<unix seconds>.png` with separators flattened to `_`.
pub fn screenshot_file_name(host: &str, port: u16, at: OffsetDateTime) -> String {
    let host: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_port_{}_{}.png", host, port, at.unix_timestamp())
}

fn find_on_path(candidates: &[&str]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|p| p.is_file())
}
