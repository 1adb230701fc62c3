//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 server with keep-alive support that hosts the proxy
//! handlers.
//!
//! # Architecture
//!
//! - **`connection`**: The per-connection request-response state machine
//! - **`headers`**: Ordered header list that keeps repeated names
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`**: HTTP request representation with its URL split into parts
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes and writes HTTP responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received (malformed → 400/413, then Close)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Route to the mounted proxy handler
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
