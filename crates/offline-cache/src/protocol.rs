//! Messages exchanged between page contexts and the coordinator.
//!
//! All messages are JSON objects discriminated by a `type` field, except the
//! `GET_CACHED_ARTICLES` reply which is a bare `{ "articles": [...] }` sent
//! only to the requesting page.

use serde::{Deserialize, Serialize};

/// Page → coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    SkipWaiting,
    CacheArticle { url: String },
    UncacheArticle { url: String },
    GetCachedArticles,
    ClearCache,
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Wire name, used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::SkipWaiting => "SKIP_WAITING",
            Command::CacheArticle { .. } => "CACHE_ARTICLE",
            Command::UncacheArticle { .. } => "UNCACHE_ARTICLE",
            Command::GetCachedArticles => "GET_CACHED_ARTICLES",
            Command::ClearCache => "CLEAR_CACHE",
        }
    }
}

/// Coordinator → every connected page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Broadcast {
    ArticleCached { url: String },
    CacheError { url: String, error: String },
    ArticleUncached { url: String },
    CacheCleared,
}

/// Reply to `GET_CACHED_ARTICLES`: pathnames currently pinned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedArticles {
    pub articles: Vec<String>,
}

/// Anything a page may receive on its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageMessage {
    Broadcast(Broadcast),
    Articles(CachedArticles),
}
