//! Model Context Protocol (MCP) engine and JSON-RPC implementations
//!
//! Provides protocol-level specifics surrounding JSON-RPC validation, negotiation, formatting, and routing.

pub mod engine;
pub mod rpc;
