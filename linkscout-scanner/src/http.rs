use crate::error::{Result, ScanError};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_HEAD_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain GET and HEAD requests with relaxed certificate validation.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                "Linkscout/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/trapdoorsec/linkscout)"
            ))
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }

    /// Fetches `url` and returns the body. Non-success statuses are errors.
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String> {
        debug!("GET {}", url);
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Other(format!("GET {} returned {}", url, status)));
        }
        Ok(response.text().await?)
    }

    /// Issues a HEAD request and returns the final status code.
    pub async fn head_status(&self, url: &str, timeout: Duration) -> Result<u16> {
        debug!("HEAD {}", url);
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScanError::Timeout(timeout.as_secs())
                } else {
                    ScanError::HttpError(e)
                }
            })?;
        Ok(response.status().as_u16())
    }
}

/// 2xx and 3xx count as reachable.
pub fn is_reachable_status(status: u16) -> bool {
    (200..400).contains(&status)
}
