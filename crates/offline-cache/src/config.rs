use crate::strategy::StrategyTable;
use url::{Origin, Url};

/// Hard cap on the number of entries in the current store.
pub const CACHE_MAX_ITEMS: usize = 150;

/// Bump on any breaking change to what the store holds.
pub const STORE_VERSION: &str = "v4";

/// Routes guaranteed to be cached at install time, relative to the base path.
pub const PRECACHE_ROUTES: &[&str] = &["", "offline/", "resume/", "writing/", "case-studies/", "adrs/"];

/// Sections whose entries count as pinned articles, relative to the base path.
pub const ARTICLE_SECTIONS: &[&str] = &["writing/", "case-studies/"];

/// Fallback page for navigations that miss both network and store.
pub const OFFLINE_ROUTE: &str = "offline/";

/// Everything a coordinator instance needs to know about its site.
///
/// Paths in `precache`, `offline_page` and `article_sections` are absolute
/// pathnames (base path already applied).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub site_id: String,
    pub version: String,
    pub base_path: String,
    pub origin: Url,
    pub max_items: usize,
    pub precache: Vec<String>,
    pub offline_page: String,
    pub article_sections: Vec<String>,
    pub skip_waiting_on_install: bool,
    pub strategies: StrategyTable,
}

impl CoordinatorConfig {
    /// Defaults for a site served under `base_path` at `origin`.
    pub fn for_site(site_id: impl Into<String>, base_path: &str, origin: Url) -> Self {
        let base_path = normalize_base(base_path);
        Self {
            site_id: site_id.into(),
            version: STORE_VERSION.to_string(),
            precache: PRECACHE_ROUTES
                .iter()
                .map(|route| under_base(&base_path, route))
                .collect(),
            offline_page: under_base(&base_path, OFFLINE_ROUTE),
            article_sections: ARTICLE_SECTIONS
                .iter()
                .map(|section| under_base(&base_path, section))
                .collect(),
            base_path,
            origin,
            max_items: CACHE_MAX_ITEMS,
            skip_waiting_on_install: true,
            strategies: StrategyTable::default(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Replace the precache manifest. Routes are relative to the base path.
    pub fn with_precache<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.precache = routes
            .into_iter()
            .map(|route| under_base(&self.base_path, route.as_ref()))
            .collect();
        self
    }

    pub fn with_offline_route(mut self, route: &str) -> Self {
        self.offline_page = under_base(&self.base_path, route);
        self
    }

    pub fn with_article_sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.article_sections = sections
            .into_iter()
            .map(|section| under_base(&self.base_path, section.as_ref()))
            .collect();
        self
    }

    pub fn with_skip_waiting_on_install(mut self, skip: bool) -> Self {
        self.skip_waiting_on_install = skip;
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyTable) -> Self {
        self.strategies = strategies;
        self
    }

    /// Name of the store this version owns, e.g. `folio-v4`.
    pub fn store_name(&self) -> String {
        format!("{}-{}", self.site_id, self.version)
    }

    pub fn origin(&self) -> Origin {
        self.origin.origin()
    }

    /// Resolve an absolute URL or a path against the site origin.
    pub fn resolve(&self, url: &str) -> Result<Url, url::ParseError> {
        self.origin.join(url)
    }

    /// Whether `path` is a pinnable article: inside an article section but
    /// not the section index itself.
    pub fn is_article_path(&self, path: &str) -> bool {
        self.article_sections
            .iter()
            .any(|section| path.starts_with(section.as_str()) && path != section)
    }
}

fn normalize_base(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn under_base(base_path: &str, route: &str) -> String {
    format!("{}/{}", base_path, route.trim_start_matches('/'))
}
