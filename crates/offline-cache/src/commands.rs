use crate::coordinator::Coordinator;
use crate::error::CommandError;
use crate::protocol::{Broadcast, CachedArticles, Command};
use crate::request::{FetchRequest, RequestKey};
use std::sync::Arc;
use tokio::sync::oneshot;
use url::Url;

impl Coordinator {
    /// Execute one page command against this version's store.
    ///
    /// Failures are reported to pages and logged; they never propagate.
    /// `SKIP_WAITING` concerns the registration, not a single version, and
    /// is only recorded here.
    pub async fn handle_command(
        &self,
        command: Command,
        reply: Option<oneshot::Sender<CachedArticles>>,
    ) {
        match command {
            Command::SkipWaiting => self.skip_waiting(),
            Command::CacheArticle { url } => match self.cache_article(&url).await {
                Ok(()) => {
                    tracing::info!(url = %url, store = self.store_name(), "cached article");
                    self.notify(Broadcast::ArticleCached { url });
                }
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "failed to cache article");
                    self.notify(Broadcast::CacheError {
                        url,
                        error: e.to_string(),
                    });
                }
            },
            Command::UncacheArticle { url } => match self.uncache_article(&url) {
                Ok(removed) => {
                    tracing::info!(url = %url, removed, "removed article from cache");
                    self.notify(Broadcast::ArticleUncached { url });
                }
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "failed to uncache article");
                    self.notify(Broadcast::CacheError {
                        url,
                        error: e.to_string(),
                    });
                }
            },
            Command::GetCachedArticles => {
                let articles = self.cached_articles();
                match reply {
                    Some(port) => {
                        if port.send(CachedArticles { articles }).is_err() {
                            tracing::debug!("page went away before the article list was ready");
                        }
                    }
                    None => tracing::warn!("GET_CACHED_ARTICLES without a reply port"),
                }
            }
            Command::ClearCache => {
                let existed = self.storage.delete(self.store_name());
                tracing::info!(store = self.store_name(), existed, "cache cleared");
                self.notify(Broadcast::CacheCleared);
            }
        }
    }

    /// Fetch `url` and pin the response into the current store.
    pub async fn cache_article(&self, url: &str) -> Result<(), CommandError> {
        let target = self.resolve_same_origin(url)?;
        let request = FetchRequest::get(target);

        let response = self.network.fetch(&request).await?;
        if !response.is_storable() {
            return Err(CommandError::BadStatus(response.status));
        }

        self.writer
            .store(RequestKey::new(&request.url), Arc::new(response));
        Ok(())
    }

    /// Unpin `url`. Returns whether an entry was removed.
    pub fn uncache_article(&self, url: &str) -> Result<bool, CommandError> {
        let key = RequestKey::new(&self.resolve_same_origin(url)?);
        Ok(self
            .current_store()
            .map(|store| store.delete(&key))
            .unwrap_or(false))
    }

    /// Pathnames of pinned articles, oldest first.
    pub fn cached_articles(&self) -> Vec<String> {
        let Some(store) = self.current_store() else {
            return Vec::new();
        };
        store
            .keys()
            .iter()
            .map(|key| key.path())
            .filter(|path| self.config.is_article_path(path))
            .map(str::to_string)
            .collect()
    }

    fn resolve_same_origin(&self, url: &str) -> Result<Url, CommandError> {
        let resolved = self
            .config
            .resolve(url)
            .map_err(|_| CommandError::InvalidUrl(url.to_string()))?;
        if &resolved.origin() != self.storage.origin() {
            return Err(CommandError::CrossOrigin(url.to_string()));
        }
        Ok(resolved)
    }
}
