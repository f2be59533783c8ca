//! Tool registration and dispatch
//!
//! Tools declare their input contract through a serde-deserializable argument
//! type. Arguments that fail to deserialize never reach the tool body and are
//! reported as protocol errors; failures raised by the body itself are folded
//! into an ordinary text result prefixed with `Error: `.

use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent, Tool};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;

/// What a tool body produces: the result text, or a failure to be reported as text.
pub type ToolOutcome = Result<String, ToolFailure>;

#[derive(Debug, Error)]
pub enum ToolFailure {
    /// A structured error raised by the tool body.
    #[error("{0}")]
    Error(Box<dyn std::error::Error + Send + Sync>),
    /// Anything else a tool body gave up with, rendered via its string form.
    #[error("{}", describe_value(.0))]
    Value(Value),
}

impl ToolFailure {
    pub fn error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Error(Box::new(err))
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
pub trait McpTool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send;

    fn definition(&self) -> Tool;

    async fn run(&self, args: Self::Args) -> ToolOutcome;
}

#[async_trait]
trait ToolHandler: Send + Sync {
    fn definition(&self) -> Tool;

    async fn invoke(&self, arguments: Value) -> Result<ToolOutcome, serde_json::Error>;
}

#[async_trait]
impl<T: McpTool> ToolHandler for T {
    fn definition(&self) -> Tool {
        McpTool::definition(self)
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutcome, serde_json::Error> {
        let args = serde_json::from_value::<T::Args>(arguments)?;
        Ok(self.run(args).await)
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<(String, Arc<dyn ToolHandler>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under the name its definition declares, replacing any
    /// tool previously registered under that name.
    pub fn register<T: McpTool>(&mut self, tool: T) {
        let name = McpTool::definition(&tool).name;
        let handler: Arc<dyn ToolHandler> = Arc::new(tool);

        match self.tools.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = handler,
            None => self.tools.push((name, handler)),
        }
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|(_, handler)| handler.definition())
            .collect()
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, AppError> {
        let handler = self.lookup(name).ok_or_else(|| AppError::ToolNotFound {
            name: name.to_string(),
        })?;

        let arguments = Value::Object(arguments.unwrap_or_default());
        let outcome = handler
            .invoke(arguments)
            .await
            .map_err(|err| AppError::invalid_arguments(name, err))?;

        let text = match outcome {
            Ok(text) => text,
            Err(failure) => {
                debug!(tool = %name, error = %failure, "tool reported failure");
                format!("Error: {failure}")
            }
        };

        Ok(CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(text, None, None))],
            is_error: None,
            meta: None,
            structured_content: None,
        })
    }

    fn lookup(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, handler)| handler)
    }
}

#[cfg(test)]
mod tests {
    use rust_mcp_sdk::macros;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    #[macros::mcp_tool(name = "echo", description = "Echo or fail on request")]
    #[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
    pub struct EchoTool {
        pub message: String,
        pub fail_with: Option<String>,
        pub fail_code: Option<i64>,
    }

    struct Echo;

    #[async_trait]
    impl McpTool for Echo {
        type Args = EchoTool;

        fn definition(&self) -> Tool {
            EchoTool::tool()
        }

        async fn run(&self, args: Self::Args) -> ToolOutcome {
            if let Some(text) = args.fail_with {
                return Err(ToolFailure::Value(Value::String(text)));
            }
            if let Some(code) = args.fail_code {
                return Err(ToolFailure::Value(json!({ "reason": code })));
            }
            Ok(format!("Result: {}", args.message))
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).expect("serialize tool result");
        value["content"][0]["text"]
            .as_str()
            .expect("text content")
            .to_string()
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry
    }

    #[tokio::test]
    async fn invokes_registered_tool() {
        let arguments = json!({ "message": "hello" });
        let result = registry()
            .invoke("echo", arguments.as_object().cloned())
            .await
            .expect("tool call should succeed");

        assert_eq!(text_of(&result), "Result: hello");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let error = registry()
            .invoke("missing", None)
            .await
            .expect_err("unknown tool must fail");

        assert!(matches!(error, AppError::ToolNotFound { name } if name == "missing"));
    }

    #[tokio::test]
    async fn shape_mismatch_never_reaches_body() {
        let arguments = json!({ "message": 42 });
        let error = registry()
            .invoke("echo", arguments.as_object().cloned())
            .await
            .expect_err("wrong type must fail validation");

        assert!(error
            .to_string()
            .starts_with("Invalid arguments for tool echo:"));
    }

    #[tokio::test]
    async fn missing_arguments_fail_validation() {
        let error = registry()
            .invoke("echo", None)
            .await
            .expect_err("missing field must fail validation");

        assert!(matches!(error, AppError::InvalidArguments { tool, .. } if tool == "echo"));
    }

    #[tokio::test]
    async fn opaque_failure_is_coerced_to_text() {
        let arguments = json!({
            "message": "ignored",
            "fail_with": "Non-Error object thrown for testing"
        });
        let result = registry()
            .invoke("echo", arguments.as_object().cloned())
            .await
            .expect("failure is still a successful call");

        assert_eq!(text_of(&result), "Error: Non-Error object thrown for testing");
    }

    #[tokio::test]
    async fn structured_value_failure_uses_its_json_form() {
        let arguments = json!({ "message": "ignored", "fail_code": 1 });
        let result = registry()
            .invoke("echo", arguments.as_object().cloned())
            .await
            .expect("failure is still a successful call");

        assert_eq!(text_of(&result), "Error: {\"reason\":1}");
    }

    #[test]
    fn register_replaces_tool_with_same_name() {
        let mut registry = registry();
        registry.register(Echo);

        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "echo");
    }
}
