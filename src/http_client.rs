//! Outbound HTTP helper for the registrar and artifact services.
//!
//! Wraps a shared [`reqwest::Client`] (one connection pool per process) and
//! turns `(host, port, service, method, headers)` into a JSON response.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::HttpConfig;

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Issues `method http://{host}:{port}{service}` and decodes the JSON body.
    ///
    /// Non-2xx responses are errors carrying the status and response text.
    pub async fn request<T: DeserializeOwned>(
        &self,
        host: &str,
        port: u16,
        service: &str,
        method: &str,
        headers: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("http://{}:{}{}", host, port, service);
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method: {}", method))?;

        let mut req = self.client.request(method.clone(), &url);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("{} {} returned {}: {}", method, url, status, body_text);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid JSON from {} {}", method, url))
    }
}
