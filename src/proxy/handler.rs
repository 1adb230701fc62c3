//! Path-rewriting proxy handler
//!
//! A `ProxyHandler` is built once per mount point from a target URL and a
//! path base. For every request it checks the path base, answers CORS
//! preflights itself, rewrites the request toward the target, and hands it to
//! its forwarding engine.

use std::sync::Arc;

use url::{Position, Url};

use crate::config::{MountConfig, QueryJoin};
use crate::error::ProxyError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::proxy::engine::ForwardingEngine;
use crate::proxy::upstream::UpstreamForwarder;

/// Validated, immutable configuration of one mount point.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    target_url: Url,
    target_path: String,
    target_authority: String,
    path_base: String,
    query_join: QueryJoin,
}

impl ProxyConfig {
    /// Parses a mount's target and path base.
    ///
    /// The target must be an absolute URL with a host. Its path is taken from
    /// the raw string, not from the parsed URL, so dot segments and encodings
    /// reach the upstream as written. `http://h` contributes an empty path and
    /// `http://h/` a single slash.
    pub fn parse(mount: &MountConfig) -> Result<Self, ProxyError> {
        let target_url =
            Url::parse(&mount.target).map_err(|e| ProxyError::configuration(&mount.target, e))?;

        if target_url.host_str().is_none() {
            return Err(ProxyError::configuration(&mount.target, "target URL has no host"));
        }

        let target_path = raw_target_path(&mount.target).to_string();
        if let Some(bad) = target_path.chars().find(|c| !c.is_ascii_graphic() || *c == '\\') {
            return Err(ProxyError::configuration(
                &mount.target,
                format!("target path contains {:?}, which cannot be sent as written", bad),
            ));
        }
        let target_authority = target_url[Position::BeforeHost..Position::AfterPort].to_string();

        Ok(Self {
            target_url,
            target_path,
            target_authority,
            path_base: mount.path_base.clone(),
            query_join: mount.query_join,
        })
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// `host[:port]` of the target.
    pub fn target_authority(&self) -> &str {
        &self.target_authority
    }

    /// Raw query of the target, empty when it has none.
    pub fn target_query(&self) -> &str {
        self.target_url.query().unwrap_or_default()
    }

    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    pub fn query_join(&self) -> QueryJoin {
        self.query_join
    }

    /// Maps a request path onto the target: the target path followed by
    /// whatever remains of `path` after the path base.
    pub fn rewrite_path(&self, path: &str) -> Result<String, ProxyError> {
        let suffix = path
            .strip_prefix(self.path_base.as_str())
            .ok_or_else(|| ProxyError::PathMismatch {
                path: path.to_string(),
                path_base: self.path_base.clone(),
            })?;

        Ok(format!("{}{}", self.target_path, suffix))
    }

    pub fn rewrite_query(&self, query: &str) -> String {
        join_query(self.target_query(), query, self.query_join)
    }
}

/// Joins the target's query with the request's query, target first.
///
/// `Verbatim` always places a `&` between the two sides, so an empty side
/// leaves a leading or trailing `&`. `SkipEmpty` drops empty sides.
pub fn join_query(target_query: &str, request_query: &str, mode: QueryJoin) -> String {
    match mode {
        QueryJoin::Verbatim => format!("{}&{}", target_query, request_query),
        QueryJoin::SkipEmpty => match (target_query.is_empty(), request_query.is_empty()) {
            (true, _) => request_query.to_string(),
            (false, true) => target_query.to_string(),
            (false, false) => format!("{}&{}", target_query, request_query),
        },
    }
}

/// The path of a raw target string: from the first `/` after the authority
/// up to the query or fragment. Empty when the target has no path.
fn raw_target_path(raw: &str) -> &str {
    let after_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let end = after_scheme.find(['?', '#']).unwrap_or(after_scheme.len());
    let before_query = &after_scheme[..end];
    before_query.find('/').map_or("", |start| &before_query[start..])
}

/// What the handler decided to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// CORS preflight, answered locally with 204
    Preflight,
    /// Request was rewritten and should be forwarded
    Forward,
}

/// Handles every request under one mount point.
#[derive(Clone)]
pub struct ProxyHandler {
    config: Arc<ProxyConfig>,
    engine: Arc<dyn ForwardingEngine>,
}

impl std::fmt::Debug for ProxyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProxyHandler {
    /// Builds a handler forwarding through an `UpstreamForwarder` bound to
    /// the mount's target.
    pub fn new(mount: &MountConfig) -> Result<Self, ProxyError> {
        let config = ProxyConfig::parse(mount)?;
        let engine = UpstreamForwarder::new(config.target_url())?;
        Ok(Self::from_parts(config, Arc::new(engine)))
    }

    /// Builds a handler forwarding through the given engine.
    pub fn with_engine(
        mount: &MountConfig,
        engine: Arc<dyn ForwardingEngine>,
    ) -> Result<Self, ProxyError> {
        Ok(Self::from_parts(ProxyConfig::parse(mount)?, engine))
    }

    pub fn from_parts(config: ProxyConfig, engine: Arc<dyn ForwardingEngine>) -> Self {
        tracing::info!(
            target_url = %config.target_url(),
            path_base = %config.path_base(),
            "Proxy mount configured"
        );

        Self {
            config: Arc::new(config),
            engine,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Validates the path base and rewrites `request` in place.
    ///
    /// The path base is checked before anything else, preflights included.
    /// A preflight is left untouched.
    pub fn rewrite(&self, request: &mut Request) -> Result<Outcome, ProxyError> {
        let path = self.config.rewrite_path(&request.path)?;

        if request.is_preflight() {
            return Ok(Outcome::Preflight);
        }

        tracing::debug!(
            request_url = %request.url(),
            target_url = %self.config.target_url(),
            "Rewriting request"
        );

        request.scheme = Some(self.config.target_url().scheme().to_string());
        request.authority = Some(self.config.target_authority().to_string());
        request.path = path;
        request.query = self.config.rewrite_query(&request.query);
        request.set_header("Host", self.config.target_authority());

        tracing::info!(rewritten_url = %request.url(), "Request URL rewritten");

        Ok(Outcome::Forward)
    }

    /// Handles one request end to end.
    pub async fn handle(&self, mut request: Request) -> Response {
        match self.rewrite(&mut request) {
            Ok(Outcome::Preflight) => Response::no_content(),
            Ok(Outcome::Forward) => self.engine.forward(request).await,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    method = %request.method,
                    path = %request.path,
                    "Rejecting request outside path base"
                );
                e.to_response()
            }
        }
    }
}
