//! MCP server integration module.
//!
//! Wires the tool handlers into an rmcp [`ServerHandler`](rmcp::ServerHandler).

pub mod service;

pub use service::DbService;
