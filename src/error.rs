//! Errors raised by the proxy handler.
//!
//! Configuration errors surface once, when a mount is built, and must stop
//! startup. Path mismatches surface per request and become an error response
//! for that request only.

use thiserror::Error;

use crate::http::response::{Response, StatusCode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("invalid proxy target {target:?}: {reason}")]
    Configuration { target: String, reason: String },

    #[error("request path {path:?} does not match path base {path_base:?}")]
    PathMismatch { path: String, path_base: String },
}

impl ProxyError {
    pub(crate) fn configuration(target: &str, reason: impl ToString) -> Self {
        ProxyError::Configuration {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Status code sent to the client when this error ends a request.
    pub fn status(&self) -> StatusCode {
        StatusCode::InternalServerError
    }

    pub fn to_response(&self) -> Response {
        Response::internal_error()
    }
}
