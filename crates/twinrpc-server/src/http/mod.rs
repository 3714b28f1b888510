//! HTTP transport layer
//!
//! Exposes the RPC endpoint and a health check.

pub mod handlers;
