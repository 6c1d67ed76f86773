/// No response could be obtained from the network.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("network unreachable: {0}")]
    Unreachable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Failure of a single page command. Reported back to pages as a
/// `CACHE_ERROR` broadcast, never propagated further.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("cross-origin URL '{0}' cannot be cached")]
    CrossOrigin(String),

    #[error("Request failed with status {0}")]
    BadStatus(u16),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("no active coordinator")]
    NoActiveCoordinator,
}

/// Precache failure. Aborts installation of the new version.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InstallError {
    #[error("invalid precache entry '{0}'")]
    InvalidUrl(String),

    #[error("precache of {url} failed: {source}")]
    Network { url: String, source: NetworkError },

    #[error("precache of {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("precache manifest has {entries} entries but the store holds at most {max_items}")]
    ManifestExceedsBound { entries: usize, max_items: usize },
}
