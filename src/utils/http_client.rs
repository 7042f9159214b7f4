use reqwest::Client;
use std::time::Duration;
use tracing::info;

use crate::error::{AssessError, Result};

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Shared client for the embedding and chat providers.
    /// Completions on long prompts can take a while, so the total timeout is generous.
    pub fn create() -> Result<Client> {
        let builder = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(30)));

        info!("🌐 [Http Client] provider client ready (timeout 120s)");

        builder
            .build()
            .map_err(|e| AssessError::Configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// POSTs a JSON body with bearer auth and returns the response text.
/// Transport failures map to `ProviderUnavailable`, error statuses to `Provider`.
pub async fn post_json(
    client: &Client,
    provider: &'static str,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<String> {
    let resp = client
        .post(url)
        .header("Authorization", format!("Bearer {}", api_key))
        .json(body)
        .send()
        .await
        .map_err(|source| AssessError::ProviderUnavailable { provider, source })?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|source| AssessError::ProviderUnavailable { provider, source })?;

    if !status.is_success() {
        let body: String = text.chars().take(500).collect();
        return Err(AssessError::Provider {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    Ok(text)
}
