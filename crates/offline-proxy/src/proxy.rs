use crate::messages::ws_messages_handler;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::routing::{any, get};
use axum::Router;
use http_body_util::BodyExt;
use offline_cache::{CachedResponse, FetchRequest, Network, Registration, Served};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use url::Url;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub registration: Arc<Registration>,
    pub network: Arc<dyn Network>,
    /// Public origin of the site; requests for any other host bypass the
    /// coordinator.
    pub origin: Url,
}

/// Main listener: the page channel plus every other path as a fetch event.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sw/messages", get(ws_messages_handler))
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Fetch-event handler. Same-origin GETs go through the active coordinator;
/// anything it does not intercept is forwarded to the upstream as-is.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Response<Body> {
    let start = Instant::now();

    let request = match fetch_request(&state.origin, req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting unparsable request");
            return plain(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    if let Some(served) = state.registration.handle_fetch(&request).await {
        tracing::debug!(
            url = %request.url,
            strategy = %served.strategy,
            outcome = served.from.as_str(),
            status = served.response.status,
            latency_us = start.elapsed().as_micros(),
            "served by coordinator"
        );
        return served_response(&served, &state.registration);
    }

    let upstream = state.network.fetch(&request).await;
    ::metrics::counter!(
        "offline_proxy_bypass_total",
        "outcome" => if upstream.is_ok() { "ok" } else { "error" }
    )
    .increment(1);

    match upstream {
        Ok(response) => {
            tracing::debug!(
                url = %request.url,
                method = %request.method,
                status = response.status,
                latency_us = start.elapsed().as_micros(),
                "BYPASS → upstream"
            );
            build_response(&response, "BYPASS", None)
        }
        Err(e) => {
            tracing::error!(error = %e, url = %request.url, "upstream request failed");
            plain(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}

/// Turn an inbound request into a fetch event. The URL's host comes from
/// the `Host` header so requests for other hosts stay cross-origin.
async fn fetch_request(origin: &Url, req: Request<Body>) -> Result<FetchRequest, String> {
    let (parts, body) = req.into_parts();

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| origin_host(origin))
        .ok_or("request without host")?;
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = Url::parse(&format!("{}://{}{}", origin.scheme(), host, path_and_query))
        .map_err(|e| e.to_string())?;

    let navigate = is_navigation(&parts.method, &parts.headers);
    let mut request = FetchRequest::new(parts.method, url);
    if navigate {
        request = request.navigate();
    }
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let body = body.collect().await.map_err(|e| e.to_string())?.to_bytes();
    Ok(request.with_body(body))
}

fn origin_host(origin: &Url) -> Option<String> {
    let host = origin.host_str()?;
    Some(match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// `Sec-Fetch-Mode: navigate`, or, for clients that do not send it, a GET
/// asking for HTML.
fn is_navigation(method: &axum::http::Method, headers: &HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode") {
        return mode.as_bytes() == b"navigate";
    }
    method == axum::http::Method::GET
        && headers
            .get(header::ACCEPT)
            .and_then(|a| a.to_str().ok())
            .is_some_and(|a| a.contains("text/html"))
}

fn served_response(served: &Served, registration: &Registration) -> Response<Body> {
    let store = registration
        .active()
        .map(|coordinator| coordinator.store_name().to_string());
    build_response(&served.response, served.from.as_str(), store.as_deref())
}

/// Build an HTTP response from a captured one.
fn build_response(cached: &CachedResponse, x_cache: &'static str, store: Option<&str>) -> Response<Body> {
    let mut response = Response::new(Body::from(cached.body.clone()));
    *response.status_mut() = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = response.headers_mut();
    for (key, value) in &cached.headers {
        if crate::network::is_hop_by_hop(key) || key.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let (Ok(k), Ok(v)) = (
            header::HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(k, v);
        }
    }

    headers.insert("x-cache", HeaderValue::from_static(x_cache));
    if let Some(v) = store.and_then(|s| HeaderValue::from_str(s).ok()) {
        headers.insert("x-cache-store", v);
    }
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
