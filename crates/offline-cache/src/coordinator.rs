use crate::config::CoordinatorConfig;
use crate::error::NetworkError;
use crate::eviction;
use crate::lifecycle::{StateCell, WorkerState};
use crate::protocol::Broadcast;
use crate::request::{FetchRequest, RequestKey};
use crate::storage::CacheStorage;
use crate::store::NamedStore;
use crate::strategy::Strategy;
use crate::traits::{CachedResponse, Network, StoreStats};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::broadcast;

const ASSET_OFFLINE: &str = "Asset not available offline";
const PAGE_OFFLINE: &str = "You are offline";
const NOT_AVAILABLE: &str = "Not available";

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Fresh from the network.
    Network,
    /// From the store, no network involved in the answer.
    Cache,
    /// From the store while a background refresh runs.
    Stale,
    /// The offline fallback page, in place of a missing navigation.
    OfflinePage,
    /// Synthesized 503.
    Unavailable,
}

impl ServedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedFrom::Network => "MISS",
            ServedFrom::Cache => "HIT",
            ServedFrom::Stale => "STALE",
            ServedFrom::OfflinePage => "FALLBACK",
            ServedFrom::Unavailable => "OFFLINE",
        }
    }
}

/// Outcome of an intercepted fetch.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Arc<CachedResponse>,
    pub from: ServedFrom,
    pub strategy: Strategy,
}

impl Served {
    fn new(response: Arc<CachedResponse>, from: ServedFrom, strategy: Strategy) -> Self {
        Self {
            response,
            from,
            strategy,
        }
    }

    fn unavailable(message: &'static str, strategy: Strategy) -> Self {
        Self::new(
            Arc::new(CachedResponse::unavailable(message)),
            ServedFrom::Unavailable,
            strategy,
        )
    }
}

/// Everything needed to fetch and persist a response, detached from the
/// coordinator so it can move into a background task.
#[derive(Clone)]
pub(crate) struct StoreWriter {
    pub(crate) storage: Arc<CacheStorage>,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) store_name: Arc<str>,
    pub(crate) max_items: usize,
    pub(crate) state: Arc<StateCell>,
}

impl StoreWriter {
    /// Fetch from the network; keep a copy of any complete success response.
    pub(crate) async fn fetch_and_store(
        &self,
        request: &FetchRequest,
        key: &RequestKey,
    ) -> Result<Arc<CachedResponse>, NetworkError> {
        let response = Arc::new(self.network.fetch(request).await?);
        if response.is_storable() {
            self.store(key.clone(), Arc::clone(&response));
        }
        Ok(response)
    }

    /// Put then trim. A replaced coordinator writes nothing, so it cannot
    /// resurrect a store that activation just deleted.
    pub(crate) fn store(&self, key: RequestKey, response: Arc<CachedResponse>) {
        let _gate = self.storage.write_gate();
        if self.state.get() == WorkerState::Redundant {
            tracing::debug!(key = %key, store = %self.store_name, "redundant coordinator, not storing");
            return;
        }
        let store = self.storage.open(&self.store_name);
        store.put(key, response);
        eviction::trim(&store, self.max_items);
    }

    async fn revalidate(self, request: FetchRequest, key: RequestKey) -> Option<Arc<CachedResponse>> {
        match self.fetch_and_store(&request, &key).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "stale-while-revalidate fetch failed");
                None
            }
        }
    }
}

/// One version of the offline cache coordinator.
///
/// Owns the name of its store, the strategy table and the lifecycle state.
/// Storage, network and the page broadcast channel are shared with other
/// versions through the [`Registration`](crate::lifecycle::Registration).
pub struct Coordinator {
    pub(crate) config: Arc<CoordinatorConfig>,
    pub(crate) storage: Arc<CacheStorage>,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) clients: broadcast::Sender<Broadcast>,
    pub(crate) writer: StoreWriter,
    pub(crate) state: Arc<StateCell>,
    pub(crate) skip_waiting: AtomicBool,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        clients: broadcast::Sender<Broadcast>,
    ) -> Self {
        let state = Arc::new(StateCell::new(WorkerState::Parsed));
        let writer = StoreWriter {
            storage: Arc::clone(&storage),
            network: Arc::clone(&network),
            store_name: config.store_name().into(),
            max_items: config.max_items,
            state: Arc::clone(&state),
        };

        Self {
            config: Arc::new(config),
            storage,
            network,
            clients,
            writer,
            state,
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store_name(&self) -> &str {
        &self.writer.store_name
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// The current-version store, if it exists.
    pub fn current_store(&self) -> Option<Arc<NamedStore>> {
        self.storage.get(self.store_name())
    }

    pub fn stats(&self) -> StoreStats {
        self.current_store()
            .map(|store| store.stats())
            .unwrap_or_default()
    }

    /// Handle a fetch event.
    ///
    /// Returns `None` when the request is not intercepted: the coordinator
    /// is not active yet, the method is not GET, or the URL is cross-origin.
    /// The caller then goes to the network directly and nothing is stored.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Option<Served> {
        if self.state() != WorkerState::Activated {
            return None;
        }
        let key = request.key()?;
        if !request.is_same_origin(self.storage.origin()) {
            return None;
        }

        let strategy = self.config.strategies.select(request.url.path());
        let served = match strategy {
            Strategy::CacheFirst => self.cache_first(request, key).await,
            Strategy::NetworkFirst => self.network_first(request, key).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, key).await,
        };

        metrics::counter!(
            "offline_cache_requests_total",
            "strategy" => strategy.as_str(),
            "outcome" => served.from.as_str()
        )
        .increment(1);

        Some(served)
    }

    /// Stored copy if present, without touching the network; otherwise fetch
    /// and keep a success response.
    pub async fn cache_first(&self, request: &FetchRequest, key: RequestKey) -> Served {
        const STRATEGY: Strategy = Strategy::CacheFirst;

        if let Some(cached) = self.lookup(&key) {
            tracing::debug!(key = %key, "cache HIT");
            return Served::new(cached, ServedFrom::Cache, STRATEGY);
        }

        match self.writer.fetch_and_store(request, &key).await {
            Ok(response) => {
                tracing::debug!(key = %key, status = response.status, "cache MISS → network");
                Served::new(response, ServedFrom::Network, STRATEGY)
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "asset unavailable offline");
                Served::unavailable(ASSET_OFFLINE, STRATEGY)
            }
        }
    }

    /// Network, falling back to the stored copy, then (for navigations) to
    /// the offline page, then to a 503.
    pub async fn network_first(&self, request: &FetchRequest, key: RequestKey) -> Served {
        const STRATEGY: Strategy = Strategy::NetworkFirst;

        let error = match self.writer.fetch_and_store(request, &key).await {
            Ok(response) => return Served::new(response, ServedFrom::Network, STRATEGY),
            Err(e) => e,
        };

        if let Some(cached) = self.lookup(&key) {
            tracing::debug!(key = %key, error = %error, "network failed, serving stored copy");
            return Served::new(cached, ServedFrom::Cache, STRATEGY);
        }

        if request.is_navigation() {
            if let Some(page) = self.offline_page() {
                tracing::debug!(key = %key, error = %error, "network failed, serving offline page");
                return Served::new(page, ServedFrom::OfflinePage, STRATEGY);
            }
        }

        tracing::debug!(key = %key, error = %error, "network failed, nothing stored");
        Served::unavailable(PAGE_OFFLINE, STRATEGY)
    }

    /// Stored copy immediately while a detached task refreshes the store.
    /// Without a stored copy, wait for that refresh.
    pub async fn stale_while_revalidate(&self, request: &FetchRequest, key: RequestKey) -> Served {
        const STRATEGY: Strategy = Strategy::StaleWhileRevalidate;

        let cached = self.lookup(&key);

        let refresh = tokio::spawn(
            self.writer
                .clone()
                .revalidate(request.clone(), key.clone()),
        );

        if let Some(stale) = cached {
            tracing::debug!(key = %key, "serving stale, revalidating in background");
            return Served::new(stale, ServedFrom::Stale, STRATEGY);
        }

        match refresh.await {
            Ok(Some(response)) => Served::new(response, ServedFrom::Network, STRATEGY),
            Ok(None) => Served::unavailable(NOT_AVAILABLE, STRATEGY),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "revalidation task failed");
                Served::unavailable(NOT_AVAILABLE, STRATEGY)
            }
        }
    }

    fn lookup(&self, key: &RequestKey) -> Option<Arc<CachedResponse>> {
        self.current_store()?.lookup(key)
    }

    fn offline_page(&self) -> Option<Arc<CachedResponse>> {
        let url = self.config.resolve(&self.config.offline_page).ok()?;
        self.lookup(&RequestKey::new(&url))
    }

    pub(crate) fn notify(&self, message: Broadcast) {
        // No subscribers is fine: pages may all be closed.
        let _ = self.clients.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Registration;
    use crate::testing::{site_config, ScriptedNetwork, ORIGIN};
    use http::Method;
    use std::time::Duration;
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    fn get(path: &str) -> FetchRequest {
        FetchRequest::get(url(path))
    }

    async fn active(network: Arc<ScriptedNetwork>) -> Arc<Coordinator> {
        let storage = Arc::new(CacheStorage::new(Url::parse(ORIGIN).unwrap().origin()));
        let registration = Registration::new(storage);
        registration.register(site_config(), network).await.unwrap()
    }

    fn body(served: &Served) -> &[u8] {
        &served.response.body[..]
    }

    #[tokio::test]
    async fn cache_first_hit_never_touches_network() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        coordinator.current_store().unwrap().put(
            RequestKey::new(&url("/app.css")),
            Arc::new(CachedResponse::new(200, vec![], "stored css")),
        );
        let before = network.calls();

        let served = coordinator.handle_fetch(&get("/app.css")).await.unwrap();

        assert_eq!(served.strategy, Strategy::CacheFirst);
        assert_eq!(served.from, ServedFrom::Cache);
        assert_eq!(body(&served), b"stored css");
        assert_eq!(network.calls(), before);
    }

    #[tokio::test]
    async fn cache_first_miss_fetches_and_stores() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;

        let first = coordinator
            .handle_fetch(&get("/folio/styles/site.css"))
            .await
            .unwrap();
        assert_eq!(first.from, ServedFrom::Network);

        let second = coordinator
            .handle_fetch(&get("/folio/styles/site.css"))
            .await
            .unwrap();
        assert_eq!(second.from, ServedFrom::Cache);
        assert_eq!(network.calls_for("/folio/styles/site.css"), 1);
    }

    #[tokio::test]
    async fn cache_first_does_not_store_failures() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;

        let served = coordinator.handle_fetch(&get("/missing.png")).await.unwrap();
        assert_eq!(served.response.status, 404);
        assert_eq!(served.from, ServedFrom::Network);
        assert!(!coordinator
            .current_store()
            .unwrap()
            .contains(&RequestKey::new(&url("/missing.png"))));
    }

    /// Answers a 206 slice when asked for a range, the full body otherwise.
    struct RangeNetwork;

    #[async_trait::async_trait]
    impl Network for RangeNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError> {
            let ranged = request
                .headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("range"));
            Ok(if ranged {
                CachedResponse::new(206, vec![], "0123")
            } else {
                CachedResponse::new(200, vec![], "0123456789")
            })
        }
    }

    #[tokio::test]
    async fn ranged_miss_is_not_stored() {
        let storage = Arc::new(CacheStorage::new(Url::parse(ORIGIN).unwrap().origin()));
        let registration = Registration::new(storage);
        let coordinator = registration
            .register(site_config().with_precache(Vec::<String>::new()), Arc::new(RangeNetwork))
            .await
            .unwrap();

        let ranged = get("/folio/fonts/body.woff2").with_header("Range", "bytes=0-3");
        let served = coordinator.handle_fetch(&ranged).await.unwrap();
        assert_eq!(served.response.status, 206);
        assert_eq!(served.from, ServedFrom::Network);

        let served = coordinator
            .handle_fetch(&get("/folio/fonts/body.woff2"))
            .await
            .unwrap();
        assert_eq!(served.response.status, 200);
        assert_eq!(served.from, ServedFrom::Network);
        assert_eq!(body(&served), b"0123456789");

        let served = coordinator
            .handle_fetch(&get("/folio/fonts/body.woff2"))
            .await
            .unwrap();
        assert_eq!(served.from, ServedFrom::Cache);
        assert_eq!(body(&served), b"0123456789");
    }

    #[tokio::test]
    async fn cache_first_offline_miss_is_503() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        network.set_offline(true);

        let served = coordinator.handle_fetch(&get("/logo.svg")).await.unwrap();
        assert_eq!(served.from, ServedFrom::Unavailable);
        assert_eq!(served.response.status, 503);
        assert_eq!(body(&served), b"Asset not available offline");
    }

    #[tokio::test]
    async fn network_first_prefers_network_and_stores() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;

        let served = coordinator.handle_fetch(&get("/folio/api/views")).await.unwrap();
        assert_eq!(served.strategy, Strategy::NetworkFirst);
        assert_eq!(served.from, ServedFrom::Network);
        assert!(coordinator
            .current_store()
            .unwrap()
            .contains(&RequestKey::new(&url("/folio/api/views"))));
    }

    #[tokio::test]
    async fn network_first_falls_back_to_stored_copy() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        coordinator.current_store().unwrap().put(
            RequestKey::new(&url("/page")),
            Arc::new(CachedResponse::new(200, vec![], "stored page")),
        );
        network.set_offline(true);

        let served = coordinator.network_first(&get("/page"), RequestKey::new(&url("/page"))).await;
        assert_eq!(served.from, ServedFrom::Cache);
        assert_eq!(body(&served), b"stored page");
    }

    #[tokio::test]
    async fn network_first_navigation_gets_offline_page() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        network.set_offline(true);

        let request = get("/folio/api/never-seen").navigate();
        let served = coordinator.handle_fetch(&request).await.unwrap();
        assert_eq!(served.from, ServedFrom::OfflinePage);
        assert_eq!(served.response.status, 200);
    }

    #[tokio::test]
    async fn network_first_subresource_gets_503_not_offline_page() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        network.set_offline(true);

        let served = coordinator
            .handle_fetch(&get("/folio/api/never-seen"))
            .await
            .unwrap();
        assert_eq!(served.from, ServedFrom::Unavailable);
        assert_eq!(body(&served), b"You are offline");
    }

    #[tokio::test]
    async fn network_first_navigation_without_offline_page_is_503() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        coordinator
            .current_store()
            .unwrap()
            .delete(&RequestKey::new(&url("/folio/offline/")));
        network.set_offline(true);

        let served = coordinator
            .handle_fetch(&get("/folio/api/never-seen").navigate())
            .await
            .unwrap();
        assert_eq!(served.response.status, 503);
    }

    #[tokio::test]
    async fn network_first_returns_error_status_without_storing() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        network.respond("/folio/api/broken", 500, "oops");

        let served = coordinator.handle_fetch(&get("/folio/api/broken")).await.unwrap();
        assert_eq!(served.response.status, 500);
        assert_eq!(served.from, ServedFrom::Network);
        assert!(!coordinator
            .current_store()
            .unwrap()
            .contains(&RequestKey::new(&url("/folio/api/broken"))));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_while_revalidate_returns_stale_immediately() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        let key = RequestKey::new(&url("/folio/rss.xml"));
        let store = coordinator.current_store().unwrap();
        store.put(key.clone(), Arc::new(CachedResponse::new(200, vec![], "stale feed")));
        network.respond("/folio/rss.xml", 200, "fresh feed");
        network.set_delay(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let served = coordinator.handle_fetch(&get("/folio/rss.xml")).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(10));
        assert_eq!(served.from, ServedFrom::Stale);
        assert_eq!(body(&served), b"stale feed");
        assert_eq!(&store.lookup(&key).unwrap().body[..], b"stale feed");

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(&store.lookup(&key).unwrap().body[..], b"fresh feed");
    }

    #[tokio::test]
    async fn stale_while_revalidate_waits_for_network_without_stale_copy() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;

        let served = coordinator.handle_fetch(&get("/folio/rss.xml")).await.unwrap();
        assert_eq!(served.strategy, Strategy::StaleWhileRevalidate);
        assert_eq!(served.from, ServedFrom::Network);
        assert_eq!(body(&served), b"<rss/>");
        assert!(coordinator
            .current_store()
            .unwrap()
            .contains(&RequestKey::new(&url("/folio/rss.xml"))));
    }

    #[tokio::test]
    async fn stale_while_revalidate_background_failure_is_swallowed() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        network.set_offline(true);

        let served = coordinator.handle_fetch(&get("/folio/")).await.unwrap();
        assert_eq!(served.from, ServedFrom::Stale);
        assert_eq!(served.response.status, 200);
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn stale_while_revalidate_offline_without_copy_is_503() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        network.set_offline(true);

        let served = coordinator
            .handle_fetch(&get("/folio/writing/not-cached/"))
            .await
            .unwrap();
        assert_eq!(served.from, ServedFrom::Unavailable);
        assert_eq!(body(&served), b"Not available");
    }

    #[tokio::test]
    async fn cross_origin_is_not_intercepted_or_stored() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        let before = coordinator.current_store().unwrap().stats().inserts;

        for target in [
            "https://cdn.test/app.css",
            "https://cdn.test/folio/",
            "https://cdn.test/api/data",
            "http://site.test/folio/",
        ] {
            let request = FetchRequest::get(Url::parse(target).unwrap());
            assert!(coordinator.handle_fetch(&request).await.is_none(), "{target}");
        }

        assert_eq!(coordinator.current_store().unwrap().stats().inserts, before);
        assert_eq!(coordinator.storage.keys(), ["folio-v4"]);
    }

    #[tokio::test]
    async fn non_get_is_not_intercepted() {
        let network = Arc::new(ScriptedNetwork::site());
        let coordinator = active(network.clone()).await;
        let request = FetchRequest::new(Method::POST, url("/folio/api/views"));
        assert!(coordinator.handle_fetch(&request).await.is_none());
    }

    #[tokio::test]
    async fn inactive_coordinator_does_not_intercept() {
        let network: Arc<dyn Network> = Arc::new(ScriptedNetwork::site());
        let storage = Arc::new(CacheStorage::new(Url::parse(ORIGIN).unwrap().origin()));
        let (clients, _) = broadcast::channel(4);
        let coordinator = Coordinator::new(site_config(), storage, network, clients);

        assert_eq!(coordinator.state(), WorkerState::Parsed);
        assert!(coordinator.handle_fetch(&get("/folio/")).await.is_none());
    }

    #[tokio::test]
    async fn strategy_inserts_keep_store_within_bound() {
        let network = Arc::new(ScriptedNetwork::site());
        let storage = Arc::new(CacheStorage::new(Url::parse(ORIGIN).unwrap().origin()));
        let registration = Registration::new(storage);
        let coordinator = registration
            .register(site_config().with_max_items(10), network.clone())
            .await
            .unwrap();

        for i in 0..30 {
            let path = format!("/folio/img/{i}.png");
            network.respond(&path, 200, "png");
            coordinator.handle_fetch(&get(&path)).await.unwrap();
            assert!(coordinator.current_store().unwrap().len() <= 10);
        }
        let keys = coordinator.current_store().unwrap().keys();
        assert_eq!(keys.first().unwrap().path(), "/folio/img/20.png");
    }
}
