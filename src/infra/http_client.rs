use crate::app::ports::{HttpClientPort, HttpGetResult, SyncTransportPort, TransportResponse};
use crate::common::constants::USER_AGENT;
use crate::common::error::{Result, ScraperError};
use crate::domain::Event;
use crate::pipeline::sync::SyncConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

/// Plain GET client for the listing page
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> std::result::Result<HttpGetResult, String> {
        let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpGetResult { status, bytes, content_type })
    }
}

/// Authenticated JSON POST to the internal sync endpoint
pub struct ReqwestSyncTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl ReqwestSyncTransport {
    pub fn new(endpoint: &str, api_key: &str, config: &SyncConfig) -> Result<Self> {
        let header_name = HeaderName::from_bytes(config.api_key_header.as_bytes()).map_err(|e| {
            ScraperError::Config(format!("invalid api_key_header '{}': {}", config.api_key_header, e))
        })?;
        let mut header_value = HeaderValue::from_str(api_key)
            .map_err(|e| ScraperError::Config(format!("invalid API key: {}", e)))?;
        header_value.set_sensitive(true);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(header_name, header_value);

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SyncTransportPort for ReqwestSyncTransport {
    async fn post_chunk(&self, events: &[Event]) -> std::result::Result<TransportResponse, String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(events)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| e.to_string())?;
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_header_name() {
        let config = SyncConfig {
            api_key_header: "bad header".to_string(),
            ..SyncConfig::default()
        };
        assert!(ReqwestSyncTransport::new("http://localhost/api", "secret", &config).is_err());
    }

    #[test]
    fn test_builds_with_default_header() {
        let transport =
            ReqwestSyncTransport::new("http://localhost/api", "secret", &SyncConfig::default())
                .unwrap();
        assert_eq!(transport.endpoint(), "http://localhost/api");
    }
}
