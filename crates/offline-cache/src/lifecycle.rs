use crate::config::CoordinatorConfig;
use crate::coordinator::{Coordinator, Served};
use crate::error::{CommandError, InstallError};
use crate::eviction;
use crate::protocol::{Broadcast, CachedArticles, Command};
use crate::request::{FetchRequest, RequestKey};
use crate::storage::CacheStorage;
use crate::traits::Network;
use arc_swap::ArcSwapOption;
use futures_util::future::try_join_all;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

/// Buffered broadcasts per page before a slow page starts skipping.
const CLIENT_CHANNEL_CAPACITY: usize = 64;

/// Coordinator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, install not started.
    Parsed,
    Installing,
    /// Precache done; waiting to take over from the active version.
    Installed,
    Activating,
    /// Intercepting fetches.
    Activated,
    /// Replaced, or failed to install. Never writes again.
    Redundant,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Parsed,
            1 => WorkerState::Installing,
            2 => WorkerState::Installed,
            3 => WorkerState::Activating,
            4 => WorkerState::Activated,
            _ => WorkerState::Redundant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free cell shared between a coordinator and its background writers.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Coordinator {
    /// Precache the manifest into this version's store.
    ///
    /// Every entry must come back with a success status; otherwise nothing
    /// from the batch is stored and the coordinator becomes redundant. A
    /// manifest larger than the store bound is refused before any fetch.
    /// Manifest entries are re-inserted as the newest entries so the trim
    /// that follows can never evict them.
    pub async fn install(&self) -> Result<(), InstallError> {
        self.state.set(WorkerState::Installing);
        let store_name = self.store_name().to_string();

        // A trim must never evict the manifest.
        let entries = self.config.precache.len();
        if entries > self.config.max_items {
            self.state.set(WorkerState::Redundant);
            let e = InstallError::ManifestExceedsBound {
                entries,
                max_items: self.config.max_items,
            };
            tracing::error!(store = %store_name, error = %e, "install failed");
            return Err(e);
        }
        tracing::info!(store = %store_name, entries = self.config.precache.len(), "precaching manifest");

        let fetches = self.config.precache.iter().map(|route| self.precache_one(route));
        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                self.state.set(WorkerState::Redundant);
                tracing::error!(store = %store_name, error = %e, "install failed");
                return Err(e);
            }
        };

        {
            let _gate = self.storage.write_gate();
            let store = self.storage.open(&store_name);
            for (key, response) in entries {
                store.delete(&key);
                store.put(key, response);
            }
            eviction::trim(&store, self.config.max_items);
        }

        if self.config.skip_waiting_on_install {
            self.skip_waiting();
        }
        self.state.set(WorkerState::Installed);
        tracing::info!(store = %store_name, "installed");
        Ok(())
    }

    async fn precache_one(
        &self,
        route: &str,
    ) -> Result<(RequestKey, Arc<crate::traits::CachedResponse>), InstallError> {
        let url = self
            .config
            .resolve(route)
            .map_err(|_| InstallError::InvalidUrl(route.to_string()))?;
        let request = FetchRequest::get(url);

        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|source| InstallError::Network {
                url: route.to_string(),
                source,
            })?;

        if !response.is_storable() {
            return Err(InstallError::BadStatus {
                url: route.to_string(),
                status: response.status,
            });
        }
        Ok((RequestKey::new(&request.url), Arc::new(response)))
    }

    /// Delete every store that is not this version's, then start
    /// intercepting. Returns the names of the deleted stores.
    pub fn activate(&self) -> Vec<String> {
        self.state.set(WorkerState::Activating);
        let current = self.store_name();

        let deleted: Vec<String> = self
            .storage
            .keys()
            .into_iter()
            .filter(|name| name != current)
            .filter(|name| {
                tracing::info!(store = %name, "deleting stale store");
                self.storage.delete(name)
            })
            .collect();

        self.state.set(WorkerState::Activated);
        tracing::info!(store = current, deleted = deleted.len(), "activated, claiming clients");
        deleted
    }

    /// Ask to take over without waiting for the active version to go away.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Relaxed);
    }

    pub fn wants_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_redundant(&self) {
        self.state.set(WorkerState::Redundant);
    }
}

/// The slot holding the active coordinator version and, at most, one
/// installed version waiting to replace it.
///
/// Storage and the page broadcast channel outlive individual versions, so
/// pages stay subscribed across updates.
pub struct Registration {
    storage: Arc<CacheStorage>,
    clients: broadcast::Sender<Broadcast>,
    active: ArcSwapOption<Coordinator>,
    waiting: Mutex<Option<Arc<Coordinator>>>,
    updating: tokio::sync::Mutex<()>,
}

impl Registration {
    pub fn new(storage: Arc<CacheStorage>) -> Self {
        let (clients, _) = broadcast::channel(CLIENT_CHANNEL_CAPACITY);
        Self {
            storage,
            clients,
            active: ArcSwapOption::empty(),
            waiting: Mutex::new(None),
            updating: tokio::sync::Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Subscribe a page context to broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.clients.subscribe()
    }

    pub fn active(&self) -> Option<Arc<Coordinator>> {
        self.active.load_full()
    }

    pub fn waiting(&self) -> Option<Arc<Coordinator>> {
        self.waiting.lock().clone()
    }

    /// Install a new version and, if it asked to skip waiting or nothing is
    /// active yet, activate it in place of the current one.
    ///
    /// An install failure leaves the active version untouched.
    pub async fn register(
        &self,
        config: CoordinatorConfig,
        network: Arc<dyn Network>,
    ) -> Result<Arc<Coordinator>, InstallError> {
        let _guard = self.updating.lock().await;

        let coordinator = Arc::new(Coordinator::new(
            config,
            Arc::clone(&self.storage),
            network,
            self.clients.clone(),
        ));
        coordinator.install().await?;

        if coordinator.wants_skip_waiting() || self.active.load().is_none() {
            self.promote(Arc::clone(&coordinator));
        } else {
            tracing::info!(store = coordinator.store_name(), "installed, waiting for SKIP_WAITING");
            if let Some(previous) = self.waiting.lock().replace(Arc::clone(&coordinator)) {
                previous.mark_redundant();
            }
        }
        Ok(coordinator)
    }

    /// Activate the waiting version, if any.
    pub fn skip_waiting(&self) -> bool {
        let Some(next) = self.waiting.lock().take() else {
            return false;
        };
        next.skip_waiting();
        self.promote(next);
        true
    }

    fn promote(&self, next: Arc<Coordinator>) {
        let _gate = self.storage.swap_gate();
        // Retire the old version before its stores go away.
        if let Some(previous) = self.active.load_full() {
            previous.mark_redundant();
        }
        next.activate();
        self.active.store(Some(next));
    }

    /// Route a fetch event to the active version.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Option<Served> {
        self.active()?.handle_fetch(request).await
    }

    /// Route a page command. `reply` is the port for `GET_CACHED_ARTICLES`.
    pub async fn dispatch(&self, command: Command, reply: Option<oneshot::Sender<CachedArticles>>) {
        metrics::counter!("offline_cache_commands_total", "command" => command.kind()).increment(1);

        if command == Command::SkipWaiting {
            if !self.skip_waiting() {
                tracing::debug!("SKIP_WAITING with no waiting version");
            }
            return;
        }

        match self.active() {
            Some(coordinator) => coordinator.handle_command(command, reply).await,
            None => {
                tracing::warn!(command = command.kind(), "no active coordinator, dropping command");
                match command {
                    Command::CacheArticle { url } => {
                        let _ = self.clients.send(Broadcast::CacheError {
                            url,
                            error: CommandError::NoActiveCoordinator.to_string(),
                        });
                    }
                    Command::GetCachedArticles => {
                        if let Some(port) = reply {
                            let _ = port.send(CachedArticles::default());
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}
