use async_trait::async_trait;

use crate::domain::Event;

// Page-source side
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult, String>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

// Sync side
#[async_trait]
pub trait SyncTransportPort: Send + Sync {
    /// POST one chunk as a JSON array. `Err` means the request never produced a response.
    async fn post_chunk(&self, events: &[Event]) -> Result<TransportResponse, String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}
