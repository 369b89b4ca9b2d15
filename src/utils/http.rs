// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a page body as text. Non-2xx responses are errors.
///
/// Parsing is left to the caller so the non-`Send` DOM never lives
/// across an `.await`.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::fetch(url, format!("HTTP status {status}")));
    }
    Ok(response.text().await?)
}

/// Issue a request and require a 2xx status, discarding the body.
pub async fn check_reachable(client: &reqwest::Client, url: &str) -> Result<()> {
    let status = client.get(url).send().await?.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(AppError::fetch(url, format!("HTTP status {status}")))
    }
}
