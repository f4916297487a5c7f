use std::time::Duration;

use jobsift_core::error::AppError;
use jobsift_core::traits::{FetchResponse, HttpSender, Route};
use reqwest::{Client, Proxy, redirect};

/// Redirect hops followed before the chain is treated as a trap.
pub const MAX_REDIRECTS: usize = 10;

/// Single-attempt HTTP sender using reqwest.
///
/// Holds one client per proxy slot plus a direct client, so connection
/// pools are never shared across exit addresses. Identity headers are set
/// per request from the route. Non-success statuses come back as responses;
/// retrying and classification belong to `ResilientFetcher`.
#[derive(Clone)]
pub struct ReqwestSender {
    direct: Client,
    proxied: Vec<Client>,
}

impl ReqwestSender {
    /// A sender with only a direct connection.
    pub fn new() -> Result<Self, AppError> {
        Self::with_proxies(&[])
    }

    /// A sender with one client per proxy URL (`http://`, `https://`, `socks5://`).
    pub fn with_proxies(proxies: &[String]) -> Result<Self, AppError> {
        let direct = Self::builder()
            .build()
            .map_err(|e| AppError::ConfigError(format!("HTTP client: {e}")))?;

        let proxied = proxies
            .iter()
            .map(|url| {
                let proxy = Proxy::all(url.as_str())
                    .map_err(|e| AppError::ConfigError(format!("Invalid proxy '{url}': {e}")))?;
                Self::builder()
                    .proxy(proxy)
                    .build()
                    .map_err(|e| AppError::ConfigError(format!("HTTP client for '{url}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { direct, proxied })
    }

    fn builder() -> reqwest::ClientBuilder {
        Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(10))
    }

    /// Number of proxied clients.
    pub fn proxy_count(&self) -> usize {
        self.proxied.len()
    }

    fn client_for(&self, route: &Route<'_>) -> &Client {
        match route.proxy {
            Some(_) => self.proxied.get(route.slot).unwrap_or(&self.direct),
            None => &self.direct,
        }
    }
}

impl HttpSender for ReqwestSender {
    async fn send(
        &self,
        url: &str,
        route: &Route<'_>,
        timeout: Duration,
    ) -> Result<FetchResponse, AppError> {
        let mut request = self
            .client_for(route)
            .get(url)
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, route.identity.user_agent.as_str());
        for (name, value) in &route.identity.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, url, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| classify(e, url, timeout))?;

        tracing::trace!(url, status, bytes = body.len(), slot = route.slot, "Response received");

        Ok(FetchResponse {
            status,
            body,
            final_url,
        })
    }
}

fn classify(e: reqwest::Error, url: &str, timeout: Duration) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout.as_millis() as u64)
    } else if e.is_redirect() {
        AppError::Blocked(format!("redirect loop at {url}"))
    } else if e.is_builder() {
        AppError::ConfigError(format!("Invalid request for {url}: {e}"))
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::NetworkError(e.to_string())
    }
}
