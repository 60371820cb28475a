use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

/// Builds the shared HTTP client. `timeout` bounds every request; an expired
/// timeout surfaces as an ordinary request error.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("emasnap/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Issues a GET and fails on transport errors and non-success statuses.
pub async fn get_success(client: &Client, url: &str) -> Result<Response> {
    debug!("Requesting {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("HTTP error: {} URL: {} body: {}", status, url, body));
    }
    Ok(response)
}
