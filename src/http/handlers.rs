//! Axum HTTP handlers for the web server
//!
//! Provides the streamable Model Context Protocol endpoint and the health endpoint.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::{SecondsFormat, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::HttpError;
use crate::http::headers::{
    accepts, is_json_content_type, session_id, APPLICATION_JSON, MCP_SESSION_ID,
    TEXT_EVENT_STREAM,
};
use crate::mcp::engine::{EngineReply, Framing, IncomingPost};
use crate::session::table::SessionId;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let session_id = session_id(&headers);
    let post = IncomingPost {
        accepts_json: accepts(&headers, APPLICATION_JSON),
        accepts_event_stream: accepts(&headers, TEXT_EVENT_STREAM),
        json_content_type: is_json_content_type(&headers),
        body: &body,
    };

    match state.router.route_post(session_id.as_deref(), post).await {
        Ok(reply) => render_reply(reply),
        Err(err) => err.into_response(),
    }
}

/// Opens the standalone server-to-client stream of a session. It carries no
/// events of its own and ends when the session closes.
pub async fn mcp_get(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, HttpError> {
    let session = state.router.session_for(session_id(&headers).as_deref())?;
    let slot = session
        .engine
        .open_event_stream(accepts(&headers, TEXT_EVENT_STREAM))?;
    let mut closed = session.engine.closed_signal();

    let events = stream::once(async move {
        let _slot = slot;
        closed.wait_for(|is_closed| *is_closed).await.ok();
    })
    .filter_map(|()| async { None::<Result<Event, Infallible>> });

    debug!(session_id = %session.id, "standalone event stream opened");
    Ok((
        session_header(&session.id),
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

pub async fn mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, HttpError> {
    state.router.terminate(session_id(&headers).as_deref())?;
    Ok(StatusCode::OK)
}

fn render_reply(reply: EngineReply) -> Response {
    let mut response = match (reply.body, reply.framing) {
        (None, _) => StatusCode::ACCEPTED.into_response(),
        (Some(payload), Framing::Json) => (StatusCode::OK, Json(payload)).into_response(),
        (Some(payload), Framing::EventStream) => event_stream_response(payload),
    };

    if let Some(id) = reply.session_id {
        response.headers_mut().extend(session_header(&id));
    }

    response
}

fn event_stream_response(payload: Value) -> Response {
    let event = Event::default().event("message").data(payload.to_string());
    Sse::new(stream::iter([Ok::<_, Infallible>(event)])).into_response()
}

fn session_header(id: &SessionId) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        headers.insert(MCP_SESSION_ID.clone(), value);
    }
    headers
}
