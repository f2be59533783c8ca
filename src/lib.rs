use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod session;

use domain::registry::ToolRegistry;
use mcp::engine::EngineSettings;
use session::{router::SessionRouter, table::SessionTable};

#[derive(Clone)]
pub struct AppState {
    pub router: SessionRouter,
}

impl AppState {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_tools(domain::default_registry(), settings)
    }

    pub fn with_tools(tools: ToolRegistry, settings: EngineSettings) -> Self {
        Self {
            router: SessionRouter::new(SessionTable::new(), Arc::new(tools), settings),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route(
            "/mcp",
            post(http::handlers::mcp_post)
                .get(http::handlers::mcp_get)
                .delete(http::handlers::mcp_delete),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
