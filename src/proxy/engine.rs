//! The seam between the proxy handler and whatever performs the outbound call.

use async_trait::async_trait;

use crate::http::request::Request;
use crate::http::response::Response;

/// Performs the outbound round trip for an already rewritten request.
///
/// An engine is bound to one target at construction and is shared by every
/// in-flight request of its mount, so it must be safe for concurrent use.
/// It may drop hop-by-hop headers but must send the request to the path and
/// query it was given. Upstream failures are reported as error responses
/// (502, 504), never as panics.
#[async_trait]
pub trait ForwardingEngine: Send + Sync {
    async fn forward(&self, request: Request) -> Response;
}
