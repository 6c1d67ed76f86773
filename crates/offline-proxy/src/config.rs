use offline_cache::config::{
    ARTICLE_SECTIONS, CACHE_MAX_ITEMS, OFFLINE_ROUTE, PRECACHE_ROUTES, STORE_VERSION,
};
use offline_cache::strategy::{DEFAULT_CACHE_FIRST, DEFAULT_STALE_WHILE_REVALIDATE};
use offline_cache::{CoordinatorConfig, StrategyTable};
use serde::Deserialize;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub strategies: StrategiesConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Origin pages see, i.e. the proxy's public address.
    #[serde(default = "default_origin")]
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,
    #[serde(default = "default_offline_page")]
    pub offline_page: String,
    #[serde(default = "default_article_sections")]
    pub article_sections: Vec<String>,
    #[serde(default = "default_skip_waiting")]
    pub skip_waiting_on_install: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategiesConfig {
    #[serde(default = "default_cache_first")]
    pub cache_first: Vec<String>,
    #[serde(default = "default_stale_while_revalidate")]
    pub stale_while_revalidate: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        // Surface bad origins and patterns at load time, not on first request.
        config.coordinator_config()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Config {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            site: SiteConfig::default(),
            cache: CacheConfig::default(),
            strategies: StrategiesConfig::default(),
        }
    }

    pub fn origin(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.site.origin)
    }

    /// Build the coordinator settings for this file.
    pub fn coordinator_config(&self) -> Result<CoordinatorConfig, Box<dyn std::error::Error>> {
        if self.cache.max_items < self.cache.precache.len() {
            return Err(format!(
                "cache.max_items ({}) is smaller than the precache manifest ({} entries)",
                self.cache.max_items,
                self.cache.precache.len()
            )
            .into());
        }
        let strategies = StrategyTable::new(
            &self.strategies.cache_first,
            &self.strategies.stale_while_revalidate,
        )?;

        Ok(
            CoordinatorConfig::for_site(&self.site.id, &self.site.base_path, self.origin()?)
                .with_version(&self.site.version)
                .with_max_items(self.cache.max_items)
                .with_precache(&self.cache.precache)
                .with_offline_route(&self.cache.offline_page)
                .with_article_sections(&self.cache.article_sections)
                .with_skip_waiting_on_install(self.cache.skip_waiting_on_install)
                .with_strategies(strategies),
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_addr: default_admin_addr(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            id: default_site_id(),
            version: default_version(),
            base_path: default_base_path(),
            origin: default_origin(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            precache: default_precache(),
            offline_page: default_offline_page(),
            article_sections: default_article_sections(),
            skip_waiting_on_install: default_skip_waiting(),
        }
    }
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            cache_first: default_cache_first(),
            stale_while_revalidate: default_stale_while_revalidate(),
        }
    }
}

/// Compare old and new config and return what can be applied live.
///
/// - site / cache / strategies changed → `Some(config)`: register a new
///   coordinator from it (a new version deletes the old store on activation)
/// - listen addresses, upstream or origin changed → WARN log, keep the old
///   value (restart required)
///
/// The returned config always carries the old restart-only fields.
pub fn diff_and_apply(old: &Config, new: &Config) -> Option<Config> {
    if old.server != new.server {
        tracing::warn!(
            old_listen = %old.server.listen_addr,
            new_listen = %new.server.listen_addr,
            old_admin = %old.server.admin_addr,
            new_admin = %new.server.admin_addr,
            "listener address change detected, ignoring. Restart to rebind"
        );
    }

    if old.upstream != new.upstream {
        tracing::warn!(
            old = %old.upstream.url,
            new = %new.upstream.url,
            "upstream change detected, ignoring. Restart to switch upstream"
        );
    }

    if old.site.origin != new.site.origin {
        tracing::warn!(
            old = %old.site.origin,
            new = %new.site.origin,
            "origin change detected, ignoring. Restart to move the stores"
        );
    }

    let applied = Config {
        server: old.server.clone(),
        upstream: old.upstream.clone(),
        site: SiteConfig {
            origin: old.site.origin.clone(),
            ..new.site.clone()
        },
        cache: new.cache.clone(),
        strategies: new.strategies.clone(),
    };

    if applied == *old {
        return None;
    }

    tracing::info!(
        old_version = %old.site.version,
        new_version = %applied.site.version,
        "config reloaded: registering a new coordinator"
    );
    Some(applied)
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_admin_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_upstream_url() -> String {
    "http://127.0.0.1:3000".to_string()
}
fn default_site_id() -> String {
    "folio".to_string()
}
fn default_version() -> String {
    STORE_VERSION.to_string()
}
fn default_base_path() -> String {
    "/folio".to_string()
}
fn default_origin() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_max_items() -> usize {
    CACHE_MAX_ITEMS
}
fn default_precache() -> Vec<String> {
    PRECACHE_ROUTES.iter().map(|r| r.to_string()).collect()
}
fn default_offline_page() -> String {
    OFFLINE_ROUTE.to_string()
}
fn default_article_sections() -> Vec<String> {
    ARTICLE_SECTIONS.iter().map(|s| s.to_string()).collect()
}
fn default_skip_waiting() -> bool {
    true
}
fn default_cache_first() -> Vec<String> {
    DEFAULT_CACHE_FIRST.iter().map(|p| p.to_string()).collect()
}
fn default_stale_while_revalidate() -> Vec<String> {
    DEFAULT_STALE_WHILE_REVALIDATE
        .iter()
        .map(|p| p.to_string())
        .collect()
}
