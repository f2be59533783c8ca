//! JSON-RPC protocol representations and formatting utilities
//!
//! Provides standardized mapping of internal AppErrors to valid JSON-RPC payloads.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde_json::{json, Value};

use crate::errors::AppError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const SERVER_ERROR: i32 = -32000;

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn app_error_to_json_rpc(id: Option<Value>, err: AppError) -> Value {
    match err {
        AppError::ToolNotFound { name } => json_rpc_error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": name,
                },
            })),
        ),
        err @ AppError::InvalidArguments { .. } => {
            json_rpc_error(id, INVALID_PARAMS, &err.to_string())
        }
    }
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let response = JsonrpcErrorResponse::new(
            RpcError {
                code: i64::from(code),
                data,
                message: message.to_string(),
            },
            Some(request_id),
        );
        return serde_json::to_value(response).expect("jsonrpc error response serialization");
    }

    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(data) = data {
        error["data"] = data;
    }

    json!({
        "jsonrpc": "2.0",
        "error": error,
        "id": Value::Null,
    })
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        return serde_json::to_value(response).expect("jsonrpc result response serialization");
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}
