//! prefix-proxy - path-rewriting reverse proxy
//!
//! Each mount point forwards the requests under its path base to one upstream
//! target, with the path base swapped for the target's own path.

pub mod config;
pub mod error;
pub mod http;
pub mod proxy;
pub mod server;
