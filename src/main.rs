use division_mcp_server::{
    build_app,
    config::Config,
    logging,
    mcp::engine::{EngineSettings, Framing},
    AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    logging::init_logging(config.mode);

    let bind_socket = config.bind_socket()?;
    let framing = if config.json_response {
        Framing::Json
    } else {
        Framing::EventStream
    };
    let state = AppState::new(EngineSettings { framing });
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        mode = ?config.mode,
        json_response = config.json_response,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
