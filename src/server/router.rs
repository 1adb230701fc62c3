//! Dispatches requests to the proxy handler mounted for their path.
//!
//! Each mount owns the requests whose path starts with its path base. When
//! several mounts match, the longest path base wins. Requests no mount
//! claims get 404.

use crate::config::MountConfig;
use crate::error::ProxyError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::proxy::handler::ProxyHandler;

#[derive(Debug, Default)]
pub struct Router {
    /// Sorted by path base length, longest first
    mounts: Vec<ProxyHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a handler for every mount. Fails on the first bad target.
    pub fn from_config(mounts: &[MountConfig]) -> Result<Self, ProxyError> {
        let mut router = Self::new();
        for mount in mounts {
            router.mount(ProxyHandler::new(mount)?);
        }
        Ok(router)
    }

    pub fn mount(&mut self, handler: ProxyHandler) {
        let len = handler.config().path_base().len();
        let at = self
            .mounts
            .iter()
            .position(|h| h.config().path_base().len() < len)
            .unwrap_or(self.mounts.len());
        self.mounts.insert(at, handler);
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn route(&self, path: &str) -> Option<&ProxyHandler> {
        self.mounts
            .iter()
            .find(|h| path.starts_with(h.config().path_base()))
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        match self.route(&request.path) {
            Some(handler) => handler.handle(request).await,
            None => {
                tracing::debug!(path = %request.path, "No mount for request path");
                Response::not_found()
            }
        }
    }
}
