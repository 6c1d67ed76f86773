//! Scripted network for unit tests.

use crate::config::CoordinatorConfig;
use crate::error::NetworkError;
use crate::request::FetchRequest;
use crate::traits::{CachedResponse, Network};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub const ORIGIN: &str = "https://site.test";

pub fn site_config() -> CoordinatorConfig {
    CoordinatorConfig::for_site("folio", "/folio", Url::parse(ORIGIN).unwrap())
}

/// Answers by path from a table; unknown paths get a 404.
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, (u16, &'static str)>>,
    calls: Mutex<Vec<String>>,
    count: AtomicUsize,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    /// The precache manifest plus a few articles and assets.
    pub fn site() -> Self {
        let network = Self::new();
        for path in [
            "/folio/",
            "/folio/offline/",
            "/folio/resume/",
            "/folio/writing/",
            "/folio/case-studies/",
            "/folio/adrs/",
        ] {
            network.respond(path, 200, "page");
        }
        network.respond("/folio/writing/a/", 200, "article a");
        network.respond("/folio/writing/offline-first/", 200, "offline first");
        network.respond("/folio/case-studies/migration/", 200, "migration");
        network.respond("/folio/styles/site.css", 200, "body{}");
        network.respond("/folio/rss.xml", 200, "<rss/>");
        network.respond("/folio/api/views", 200, "{\"views\":1}");
        network
    }

    pub fn respond(&self, path: &str, status: u16, body: &'static str) {
        self.routes.lock().insert(path.to_string(), (status, body));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|p| *p == path).count()
    }
}

#[async_trait::async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let path = request.url.path().to_string();
        self.calls.lock().push(path.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Checked after the delay so a test can go offline mid-flight.
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable("scripted offline".into()));
        }

        let (status, body) = self
            .routes
            .lock()
            .get(&path)
            .copied()
            .unwrap_or((404, "not found"));
        Ok(CachedResponse::new(status, vec![], body))
    }
}
