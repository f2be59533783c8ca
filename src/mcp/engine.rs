//! The per-session Model Context Protocol engine
//!
//! Decodes JSON-RPC payloads, negotiates capabilities on `initialize`, and
//! dispatches tool calls to the registry. Each engine serves exactly one
//! session; requests against it are handled one at a time.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolRequestParams, Implementation, InitializeRequest, InitializeResult,
    JsonrpcMessage, JsonrpcRequest, ListToolsRequest, ListToolsResult, PingRequest,
    ServerCapabilities, ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::domain::registry::ToolRegistry;
use crate::errors::HttpError;
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
    request_id_to_value, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    SERVER_ERROR,
};
use crate::session::table::{SessionCloseHook, SessionId};

pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];
pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

pub const SERVER_INSTRUCTIONS: &str =
    "This MCP server allows LLMs to divide numbers with proper error handling.";

const NOT_ACCEPTABLE_POST: &str =
    "Not Acceptable: Client must accept both application/json and text/event-stream";
const NOT_ACCEPTABLE_GET: &str = "Not Acceptable: Client must accept text/event-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    EventStream,
    Json,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSettings {
    pub framing: Framing,
}

/// A POST as the engine sees it, with content negotiation already evaluated.
#[derive(Debug, Clone, Copy)]
pub struct IncomingPost<'a> {
    pub accepts_json: bool,
    pub accepts_event_stream: bool,
    pub json_content_type: bool,
    pub body: &'a [u8],
}

#[derive(Debug)]
pub struct EngineReply {
    /// `None` when the payload held only notifications.
    pub body: Option<Value>,
    pub framing: Framing,
    pub session_id: Option<SessionId>,
    /// Set exactly once, on the reply that completed the handshake.
    pub established: Option<SessionId>,
}

#[derive(Debug, Default)]
struct EngineState {
    protocol_version: Option<&'static str>,
}

pub struct ProtocolEngine {
    tools: Arc<ToolRegistry>,
    settings: EngineSettings,
    state: Mutex<EngineState>,
    session_id: OnceLock<SessionId>,
    closed: watch::Sender<bool>,
    close_hook: SessionCloseHook,
    event_stream_open: Arc<AtomicBool>,
}

/// Holds the single standalone event-stream slot of a session while alive.
pub struct EventStreamSlot(Arc<AtomicBool>);

impl Drop for EventStreamSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ProtocolEngine {
    pub fn new(tools: Arc<ToolRegistry>, settings: EngineSettings, close_hook: SessionCloseHook) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            tools,
            settings,
            state: Mutex::new(EngineState::default()),
            session_id: OnceLock::new(),
            closed,
            close_hook,
            event_stream_open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.get()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the engine has closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Closes the engine and drops its session table entry. Does not wait for
    /// an in-flight request. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.send_replace(true) {
            return false;
        }

        if let Some(id) = self.session_id.get() {
            self.close_hook.session_closed(id);
            info!(session_id = %id, "session closed");
        }
        true
    }

    pub async fn handle_post(&self, post: IncomingPost<'_>) -> Result<EngineReply, HttpError> {
        if !post.accepts_json || !post.accepts_event_stream {
            return Err(HttpError::NotAcceptable(NOT_ACCEPTABLE_POST));
        }

        if !post.json_content_type {
            return Err(HttpError::UnsupportedMediaType);
        }

        let mut state = self.state.lock().await;
        if self.is_closed() {
            return Err(HttpError::NoValidSession);
        }

        let was_initialized = state.protocol_version.is_some();
        let body = match serde_json::from_slice::<Value>(post.body) {
            Ok(payload) => self.handle_payload(&mut state, payload).await,
            Err(_) => Some(json_rpc_error(None, PARSE_ERROR, "Parse error")),
        };

        let established = match (was_initialized, state.protocol_version.is_some()) {
            (false, true) => self.session_id.get().cloned(),
            _ => None,
        };

        Ok(EngineReply {
            body,
            framing: self.settings.framing,
            session_id: self.session_id.get().cloned(),
            established,
        })
    }

    /// Claims the session's standalone server-to-client event stream.
    pub fn open_event_stream(&self, accepts_event_stream: bool) -> Result<EventStreamSlot, HttpError> {
        if !accepts_event_stream {
            return Err(HttpError::NotAcceptable(NOT_ACCEPTABLE_GET));
        }

        if self.is_closed() {
            return Err(HttpError::InvalidSessionHeader);
        }

        if self.event_stream_open.swap(true, Ordering::AcqRel) {
            return Err(HttpError::StreamConflict);
        }

        Ok(EventStreamSlot(Arc::clone(&self.event_stream_open)))
    }

    async fn handle_payload(&self, state: &mut EngineState, payload: Value) -> Option<Value> {
        let Some(batch) = payload.as_array() else {
            return self.handle_json_rpc_value(state, payload).await;
        };

        if batch.is_empty() {
            return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.handle_json_rpc_value(state, item.clone()).await {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            None
        } else {
            Some(Value::Array(responses))
        }
    }

    async fn handle_json_rpc_value(&self, state: &mut EngineState, payload: Value) -> Option<Value> {
        if !payload.is_object() {
            return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
        }

        let request_id = payload.get("id").cloned();
        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")),
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                if let Err(error_response) = validate_request_shape(&request) {
                    return Some(error_response);
                }

                let request_id = request_id_to_value(request.id);
                if request.method.trim().is_empty() {
                    return Some(json_rpc_error(Some(request_id), INVALID_REQUEST, "Invalid Request"));
                }

                Some(
                    self.handle_json_rpc_request(
                        state,
                        Some(request_id),
                        request.method,
                        request.params.map(Value::Object),
                    )
                    .await,
                )
            }
            JsonrpcMessage::Notification(notification) => {
                debug!(
                    session_id = %self.session_label(),
                    method = %notification.method,
                    "notification received"
                );
                None
            }
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
                Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"))
            }
        }
    }

    async fn handle_json_rpc_request(
        &self,
        state: &mut EngineState,
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    ) -> Value {
        let audit_params = redact_audit_params(params.as_ref());

        let response = match (method.as_str(), state.protocol_version) {
            ("initialize", Some(_)) => json_rpc_error(
                id,
                INVALID_REQUEST,
                "Invalid Request: Server already initialized",
            ),
            ("initialize", None) => self.initialize(state, id, params.as_ref()),
            (_, None) => json_rpc_error(id, SERVER_ERROR, "Bad Request: Server not initialized"),
            ("ping", Some(_)) => json_rpc_result(id, json!({})),
            ("tools/list", Some(_)) => json_rpc_result(
                id,
                serde_json::to_value(ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: self.tools.definitions(),
                })
                .expect("tools list result serialization"),
            ),
            ("tools/call", Some(_)) => self.call_tool(id, params).await,
            ("resources/list", Some(_)) => json_rpc_result(id, json!({ "resources": [] })),
            ("completion/complete", Some(_)) => json_rpc_result(
                id,
                json!({ "completion": { "values": [], "total": 0, "hasMore": false } }),
            ),
            _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
        };

        info!(
            session_id = %self.session_label(),
            method = %method,
            params = %audit_params,
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        response
    }

    fn initialize(&self, state: &mut EngineState, id: Option<Value>, params: Option<&Value>) -> Value {
        let protocol_version = negotiate_protocol_version(params);

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: Some(ServerCapabilitiesResources {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
                completions: Some(serde_json::Map::new()),
                ..Default::default()
            },
            protocol_version: protocol_version.to_string(),
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            meta: None,
        };

        let session_id = self
            .session_id
            .get_or_init(SessionId::generate)
            .clone();
        state.protocol_version = Some(protocol_version);
        info!(session_id = %session_id, protocol_version, "session handshake completed");

        json_rpc_result(
            id,
            serde_json::to_value(initialize_result).expect("initialize result serialization"),
        )
    }

    async fn call_tool(&self, id: Option<Value>, params: Option<Value>) -> Value {
        let Some(raw_params) = params else {
            return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
        };

        let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
            Ok(value) => value,
            Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
        };

        match self.tools.invoke(&tool_call.name, tool_call.arguments).await {
            Ok(result) => json_rpc_result(
                id,
                serde_json::to_value(result).expect("tool result serialization"),
            ),
            Err(err) => app_error_to_json_rpc(id, err),
        }
    }

    fn session_label(&self) -> &str {
        self.session_id.get().map(SessionId::as_str).unwrap_or("-")
    }
}

/// Whether `payload` is a single, well-formed `initialize` request.
pub fn is_initialize_request(payload: &Value) -> bool {
    payload.get("method").and_then(Value::as_str) == Some("initialize")
        && payload.get("id").is_some_and(|id| !id.is_null())
        && serde_json::from_value::<InitializeRequest>(payload.clone()).is_ok()
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let payload = serde_json::to_value(request).expect("jsonrpc request serialization");
    let request_id = Some(request_id_to_value(request.id.clone()));

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

/// Echoes a supported requested version, otherwise answers with the latest.
pub fn negotiate_protocol_version(params: Option<&Value>) -> &'static str {
    let requested = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim);

    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|supported| Some(*supported) == requested)
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
