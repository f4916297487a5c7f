/// Smoke-test for `BrowserRenderer`.
///
/// Launches a headless Chromium, renders <https://example.com>, and checks
/// the rendered HTML passes the blocked-response detector.
///
/// Run with:
///   cargo run -p jobsift-client --example render_smoke --features browser
use std::time::Duration;

use jobsift_client::BrowserRenderer;
use jobsift_core::blocked::{PageKind, check_response};
use jobsift_core::traits::Fetcher;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let Some(renderer) = BrowserRenderer::detect(Duration::from_secs(30)) else {
        anyhow::bail!("no Chromium binary found; set CHROME_BIN");
    };

    let url = "https://example.com";
    println!("Rendering {url} ...");
    let response = renderer.fetch(url, &CancellationToken::new()).await?;

    anyhow::ensure!(
        response.body.contains("Example Domain"),
        "expected heading not found in rendered HTML"
    );
    if let Some(reason) = check_response(&response, PageKind::Rendered) {
        anyhow::bail!("rendered page classified as blocked: {reason}");
    }

    println!("OK: {} bytes from {}", response.body.len(), response.final_url);
    Ok(())
}
