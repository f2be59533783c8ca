//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing, including the `/mcp` streamable endpoint and health reporting.

pub mod handlers;
pub mod headers;
