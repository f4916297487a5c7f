use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use jobsift_core::error::AppError;
use jobsift_core::traits::{FetchResponse, Fetcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound for closing the browser and reaping its process.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Rendered-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// Every [`Fetcher::fetch`] call launches its own headless browser, renders
/// one page and tears the browser down again, whether the render succeeded,
/// failed, timed out or was cancelled. Nothing is shared between calls.
#[derive(Debug, Clone)]
pub struct BrowserRenderer {
    executable: Option<PathBuf>,
    timeout: Duration,
}

impl BrowserRenderer {
    /// A renderer with the given navigation timeout. Does not launch anything.
    pub fn new(timeout: Duration) -> Self {
        Self {
            executable: find_chrome_binary(),
            timeout,
        }
    }

    /// A renderer when a Chromium binary can be found, otherwise `None`.
    pub fn detect(timeout: Duration) -> Option<Self> {
        let renderer = Self::new(timeout);
        match renderer.config() {
            Ok(_) => {
                tracing::info!(
                    executable = ?renderer.executable,
                    "Rendered-browser strategy available"
                );
                Some(renderer)
            }
            Err(e) => {
                tracing::info!(error = %e, "No Chromium found; rendered-browser strategy disabled");
                None
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();
        if let Some(bin) = &self.executable {
            builder = builder.chrome_executable(bin);
        }
        builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::ConfigError(format!("Browser config error: {e}")))
    }
}

impl Fetcher for BrowserRenderer {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<FetchResponse, AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let session = BrowserSession::launch(self.config()?).await?;
        render_scoped(session, url, self.timeout, RELEASE_TIMEOUT, cancel).await
    }
}

/// A launched browser that can render pages until it is released.
trait RenderSession: Send {
    fn render(&self, url: &str) -> impl Future<Output = Result<FetchResponse, AppError>> + Send;

    fn release(self) -> impl Future<Output = ()> + Send;
}

/// Render one page, then release the session on every exit path.
///
/// A release that outlives `release_timeout` is abandoned; dropping the
/// session then aborts whatever it still holds.
async fn render_scoped<S: RenderSession>(
    session: S,
    url: &str,
    timeout: Duration,
    release_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<FetchResponse, AppError> {
    let result = tokio::select! {
        rendered = tokio::time::timeout(timeout, session.render(url)) => match rendered {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(timeout.as_millis() as u64)),
        },
        () = cancel.cancelled() => Err(AppError::Cancelled),
    };

    if tokio::time::timeout(release_timeout, session.release())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_ms = release_timeout.as_millis() as u64,
            "Browser release timed out, abandoning the process"
        );
    }
    result
}

/// One launched browser and the task driving its CDP connection.
///
/// `release` is the orderly shutdown. Dropping an unreleased session still
/// aborts the handler task and lets chromiumoxide kill the child process.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig) -> Result<Self, AppError> {
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Browser CDP handler stopped");
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }
}

impl RenderSession for BrowserSession {
    async fn render(&self, url: &str) -> Result<FetchResponse, AppError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to navigate to {url}: {e}")))?;

        page.find_element("body")
            .await
            .map_err(|e| AppError::ParseError(format!("Page did not render body: {e}")))?;

        let body = page
            .content()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read page content: {e}")))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        let _ = page.close().await;

        Ok(FetchResponse {
            status: 200,
            body,
            final_url,
        })
    }

    async fn release(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "Browser close failed");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "Waiting for browser process failed");
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Locate a real Chrome/Chromium binary.
///
/// `CHROME_BIN` wins. The snap wrapper at `/snap/bin/chromium` strips
/// headless flags, so the binary inside the snap is preferred over it.
/// `None` leaves the lookup to chromiumoxide.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
