use crate::error::NetworkError;
use crate::request::FetchRequest;
use bytes::Bytes;
use serde::Serialize;
use std::time::Instant;

/// Snapshot of an HTTP response, captured once and never mutated.
///
/// Network responses and stored entries share this type so the same `Arc`
/// can be handed to the caller and written into a store.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub captured_at: Instant,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            captured_at: Instant::now(),
        }
    }

    /// Synthesized 503 returned when neither the store nor the network can
    /// answer a request.
    pub fn unavailable(message: &'static str) -> Self {
        Self::new(
            503,
            vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            Bytes::from_static(message.as_bytes()),
        )
    }

    /// 2xx, matching the browser's `Response.ok`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether this response may become a store entry: a success that is a
    /// complete representation, so never a 206 partial.
    pub fn is_storable(&self) -> bool {
        self.is_success() && self.status != 206
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Snapshot of store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub current_size: usize,
}

/// The real network, as seen by the coordinator.
///
/// Any response the server produced (including 4xx/5xx) is `Ok`; `Err` means
/// no response was obtained at all. Implementations must not add timeouts of
/// their own: a hung fetch hangs the strategy that issued it.
#[async_trait::async_trait]
pub trait Network: Send + Sync + 'static {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError>;
}
