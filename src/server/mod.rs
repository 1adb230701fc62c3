//! Listener and mount-point dispatch.

pub mod listener;
pub mod router;

pub use router::Router;
