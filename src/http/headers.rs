//! Request header handling for the streamable HTTP transport

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum_extra::headers::{self, Header, HeaderMapExt};

pub static MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_EVENT_STREAM: &str = "text/event-stream";

/// The `mcp-session-id` header. Empty values are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSessionId(pub String);

impl Header for McpSessionId {
    fn name() -> &'static HeaderName {
        &MCP_SESSION_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let id = value
            .to_str()
            .map_err(|_| headers::Error::invalid())?
            .trim();

        if id.is_empty() {
            return Err(headers::Error::invalid());
        }

        Ok(Self(id.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers.typed_get::<McpSessionId>().map(|McpSessionId(id)| id)
}

/// Whether any `Accept` entry admits `media_type`, honouring `*/*` and `type/*`.
pub fn accepts(headers: &HeaderMap, media_type: &str) -> bool {
    let (wanted_type, _) = media_type.split_once('/').unwrap_or((media_type, ""));

    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|entry| entry.split(';').next().unwrap_or_default().trim())
        .any(|entry| {
            entry.eq_ignore_ascii_case(media_type)
                || entry == "*/*"
                || entry
                    .split_once('/')
                    .is_some_and(|(kind, sub)| sub == "*" && kind.eq_ignore_ascii_case(wanted_type))
        })
}

pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(APPLICATION_JSON))
}
