//! Hosted document service
//!
//! A line-delimited JSON-RPC 2.0 protocol over TCP, and the server that
//! serves a record store to remote sessions through it.

pub mod protocol;
pub mod server;

// Re-export main types
pub use server::DocumentServer;
