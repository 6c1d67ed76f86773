use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Static assets: style sheets, scripts, fonts, images, icons.
pub const DEFAULT_CACHE_FIRST: &[&str] =
    &[r"\.(css|js|woff2?|ttf|eot|svg|png|jpg|jpeg|gif|webp|avif|ico)$"];

/// HTML documents, directory-style routes, the feed and sitemaps.
pub const DEFAULT_STALE_WHILE_REVALIDATE: &[&str] =
    &[r"\.html$", r"/$", r"/rss\.xml$", r"/sitemap.*\.xml$"];

/// Read/write ordering between store and network for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    StaleWhileRevalidate,
    NetworkFirst,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
            Strategy::NetworkFirst => "network-first",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path patterns deciding the strategy for each request.
///
/// Cache-first patterns are checked before stale-while-revalidate ones;
/// anything matching neither is network-first.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    cache_first: Vec<Regex>,
    stale_while_revalidate: Vec<Regex>,
}

impl StrategyTable {
    pub fn new<I, J, S, T>(cache_first: I, stale_while_revalidate: J) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Ok(Self {
            cache_first: compile(cache_first)?,
            stale_while_revalidate: compile(stale_while_revalidate)?,
        })
    }

    /// Total and side-effect free.
    pub fn select(&self, path: &str) -> Strategy {
        if self.cache_first.iter().any(|re| re.is_match(path)) {
            Strategy::CacheFirst
        } else if self.stale_while_revalidate.iter().any(|re| re.is_match(path)) {
            Strategy::StaleWhileRevalidate
        } else {
            Strategy::NetworkFirst
        }
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        // The default patterns are constants known to compile.
        Self::new(DEFAULT_CACHE_FIRST, DEFAULT_STALE_WHILE_REVALIDATE)
            .unwrap_or_else(|_| unreachable!())
    }
}

fn compile<I, S>(patterns: I) -> Result<Vec<Regex>, regex::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns.into_iter().map(|p| Regex::new(p.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_assets_are_cache_first() {
        let table = StrategyTable::default();
        for path in [
            "/folio/styles/site.css",
            "/folio/app.js",
            "/fonts/inter.woff2",
            "/fonts/inter.woff",
            "/fonts/mono.ttf",
            "/img/logo.svg",
            "/img/hero.avif",
            "/img/photo.jpeg",
            "/favicon.ico",
        ] {
            assert_eq!(table.select(path), Strategy::CacheFirst, "{path}");
        }
    }

    #[test]
    fn documents_are_stale_while_revalidate() {
        let table = StrategyTable::default();
        for path in [
            "/",
            "/folio/",
            "/folio/writing/some-post/",
            "/folio/about.html",
            "/folio/rss.xml",
            "/folio/sitemap-index.xml",
            "/sitemap-0.xml",
        ] {
            assert_eq!(table.select(path), Strategy::StaleWhileRevalidate, "{path}");
        }
    }

    #[test]
    fn everything_else_is_network_first() {
        let table = StrategyTable::default();
        for path in [
            "",
            "/folio/api/views",
            "/folio/writing/some-post",
            "/feed.xml",
            "/data.json",
            "/styles.css.map",
        ] {
            assert_eq!(table.select(path), Strategy::NetworkFirst, "{path}");
        }
    }

    #[test]
    fn asset_pattern_wins_over_document_pattern() {
        let table = StrategyTable::new([r"\.xml$"], [r"/rss\.xml$"]).unwrap();
        assert_eq!(table.select("/rss.xml"), Strategy::CacheFirst);
    }

    #[test]
    fn selection_is_deterministic() {
        let table = StrategyTable::default();
        for path in ["/a.css", "/b/", "/c", "/rss.xml", "/x.html", "/%20/"] {
            let first = table.select(path);
            for _ in 0..10 {
                assert_eq!(table.select(path), first);
            }
        }
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(StrategyTable::new(["(unclosed"], DEFAULT_STALE_WHILE_REVALIDATE).is_err());
    }

    #[test]
    fn strategy_names() {
        assert_eq!(Strategy::CacheFirst.to_string(), "cache-first");
        assert_eq!(
            serde_json::to_string(&Strategy::StaleWhileRevalidate).unwrap(),
            "\"stale-while-revalidate\""
        );
    }
}
