//! Tools exposed via Model Context Protocol
//!
//! Provides the tool registry and the `divide_numbers` tool registered into it.

pub mod divide;
pub mod registry;

use registry::ToolRegistry;

/// Registry holding every tool this server exposes.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(divide::DivideNumbers);
    registry
}
