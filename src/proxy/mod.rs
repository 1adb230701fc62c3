//! Reverse proxy functionality
//!
//! This module implements the per-mount proxy handler and the engine that
//! performs the outbound call.

pub mod engine;
pub mod handler;
pub mod upstream;

pub use engine::ForwardingEngine;
pub use handler::{Outcome, ProxyConfig, ProxyHandler};
pub use upstream::UpstreamForwarder;
