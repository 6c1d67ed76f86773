use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const BASE: &str = "/folio";

/// (section, slug, title)
const PAGES: &[(&str, &str, &str)] = &[
    ("writing", "offline-first", "Offline first, for a static site"),
    ("writing", "eviction-by-age", "Evicting by age, not by use"),
    ("writing", "stale-while-revalidate", "Serving stale on purpose"),
    ("case-studies", "migration", "Moving a portfolio off a CMS"),
    ("case-studies", "image-pipeline", "An image pipeline in one afternoon"),
    ("adrs", "0001-cache-strategies", "ADR 0001: per-path cache strategies"),
    ("adrs", "0002-store-versioning", "ADR 0002: versioned stores"),
];

static VIEWS: AtomicU64 = AtomicU64::new(0);

/// Simulate origin latency (5-20ms)
async fn latency() {
    let delay = rand::thread_rng().gen_range(5..=20);
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title>\
         <link rel=\"stylesheet\" href=\"{BASE}/styles/site.css\"></head>\
         <body><main><h1>{title}</h1>{body}</main>\
         <script src=\"{BASE}/scripts/app.js\"></script></body></html>"
    ))
}

fn section_title(section: &str) -> Option<&'static str> {
    match section {
        "writing" => Some("Writing"),
        "case-studies" => Some("Case studies"),
        "adrs" => Some("Architecture decisions"),
        _ => None,
    }
}

async fn home() -> Html<String> {
    latency().await;
    page(
        "Folio",
        &format!(
            "<ul><li><a href=\"{BASE}/writing/\">Writing</a></li>\
             <li><a href=\"{BASE}/case-studies/\">Case studies</a></li>\
             <li><a href=\"{BASE}/adrs/\">ADRs</a></li>\
             <li><a href=\"{BASE}/resume/\">Résumé</a></li></ul>"
        ),
    )
}

async fn offline() -> Html<String> {
    page(
        "You are offline",
        "<p>This page is not saved for offline reading. Pinned articles are still available.</p>",
    )
}

async fn resume() -> Html<String> {
    latency().await;
    page("Résumé", "<p>Systems, storage, the occasional static site.</p>")
}

async fn section(Path(section): Path<String>) -> Response {
    latency().await;
    let Some(title) = section_title(&section) else {
        return not_found().await.into_response();
    };
    let items: String = PAGES
        .iter()
        .filter(|(s, _, _)| *s == section)
        .map(|(s, slug, title)| format!("<li><a href=\"{BASE}/{s}/{slug}/\">{title}</a></li>"))
        .collect();
    page(title, &format!("<ul>{items}</ul>")).into_response()
}

async fn article(Path((section, slug)): Path<(String, String)>) -> Response {
    latency().await;
    match PAGES
        .iter()
        .find(|(s, sl, _)| *s == section && *sl == slug)
    {
        Some((_, _, title)) => page(title, &"<p>Lorem ipsum dolor sit amet.</p>".repeat(20))
            .into_response(),
        None => not_found().await.into_response(),
    }
}

async fn stylesheet() -> impl IntoResponse {
    latency().await;
    (
        [
            (header::CONTENT_TYPE, "text/css"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        "body{font-family:system-ui;max-width:40rem;margin:auto}",
    )
}

async fn script() -> impl IntoResponse {
    latency().await;
    (
        [(header::CONTENT_TYPE, "text/javascript")],
        "document.documentElement.dataset.ready = 'true';",
    )
}

async fn feed() -> impl IntoResponse {
    latency().await;
    let items: String = PAGES
        .iter()
        .filter(|(s, _, _)| *s == "writing")
        .map(|(s, slug, title)| {
            format!("<item><title>{title}</title><link>{BASE}/{s}/{slug}/</link></item>")
        })
        .collect();
    (
        [(header::CONTENT_TYPE, "application/rss+xml")],
        format!("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Folio</title>{items}</channel></rss>"),
    )
}

async fn sitemap() -> impl IntoResponse {
    let urls: String = PAGES
        .iter()
        .map(|(s, slug, _)| format!("<url><loc>{BASE}/{s}/{slug}/</loc></url>"))
        .collect();
    (
        [(header::CONTENT_TYPE, "application/xml")],
        format!("<?xml version=\"1.0\"?><urlset>{urls}</urlset>"),
    )
}

/// Dynamic endpoint: never worth caching beyond a network failure.
async fn views() -> impl IntoResponse {
    latency().await;
    let views = VIEWS.fetch_add(1, Ordering::Relaxed) + 1;
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({ "views": views })),
    )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, page("Not found", "<p>Nothing here.</p>"))
}

async fn health() -> &'static str {
    "ok"
}

fn app() -> Router {
    Router::new()
        .route("/folio/", get(home))
        .route("/folio/offline/", get(offline))
        .route("/folio/resume/", get(resume))
        .route("/folio/styles/site.css", get(stylesheet))
        .route("/folio/scripts/app.js", get(script))
        .route("/folio/rss.xml", get(feed))
        .route("/folio/sitemap.xml", get(sitemap))
        .route("/folio/api/views", get(views).post(views))
        .route("/folio/{section}/", get(section))
        .route("/folio/{section}/{slug}/", get(article))
        .route("/health", get(health))
        .fallback(not_found)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = "0.0.0.0:3000";
    tracing::info!(addr, base = BASE, pages = PAGES.len(), "demo site starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind demo site to {addr}: {e}"));
    if let Err(e) = axum::serve(listener, app()).await {
        tracing::error!(error = %e, "demo site error");
    }
}
