use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use offline_cache::{CachedResponse, FetchRequest, Network, NetworkError};

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// The real network behind the proxy: every fetch is sent to the upstream
/// site with the same path and query.
pub struct UpstreamNetwork {
    client: HttpClient,
    upstream_url: String,
}

impl UpstreamNetwork {
    pub fn new(upstream_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            upstream_url: upstream_url.into(),
        }
    }

    fn upstream_uri(&self, request: &FetchRequest) -> String {
        let url = &request.url;
        let mut uri = format!("{}{}", self.upstream_url.trim_end_matches('/'), url.path());
        if let Some(query) = url.query() {
            uri.push('?');
            uri.push_str(query);
        }
        uri
    }
}

#[async_trait]
impl Network for UpstreamNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError> {
        let upstream_uri = self.upstream_uri(request);

        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(&upstream_uri);
        for (name, value) in &request.headers {
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("host") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        let upstream_req = builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        let upstream_resp = self.client.request(upstream_req).await.map_err(|e| {
            tracing::debug!(error = %e, upstream = %upstream_uri, "upstream request failed");
            NetworkError::Unreachable(e.to_string())
        })?;

        let status = upstream_resp.status().as_u16();
        let headers: Vec<(String, String)> = upstream_resp
            .headers()
            .iter()
            .filter(|(k, _)| !is_hop_by_hop(k.as_str()))
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();

        let body = upstream_resp
            .into_body()
            .collect()
            .await
            .map_err(|e| NetworkError::Body(e.to_string()))?
            .to_bytes();

        Ok(CachedResponse::new(status, headers, body))
    }
}
