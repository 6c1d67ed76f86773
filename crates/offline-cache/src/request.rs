use bytes::Bytes;
use http::Method;
use std::fmt;
use url::{Origin, Url};

/// Whether a request is a top-level page navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigate,
    #[default]
    Subresource,
}

/// An outbound request intercepted by the coordinator.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::Subresource,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Mark this request as a page navigation.
    pub fn navigate(mut self) -> Self {
        self.mode = RequestMode::Navigate;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn is_same_origin(&self, origin: &Origin) -> bool {
        &self.url.origin() == origin
    }

    /// Store identity for this request. Only GET requests have one.
    pub fn key(&self) -> Option<RequestKey> {
        if self.method == Method::GET {
            Some(RequestKey::new(&self.url))
        } else {
            None
        }
    }
}

/// Identity of a stored entry: the absolute URL with its fragment removed.
/// The method is implicitly GET.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(Url);

impl RequestKey {
    pub fn new(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url)
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
