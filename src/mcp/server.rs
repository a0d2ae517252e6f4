use crate::app::App;
use crate::errors::{ErrorCategory, ErrorCode, McpError, ToolError};
use crate::mcp::catalog::tool_defs;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, ToolCallParams};
use crate::services::config::ConfigOverrides;
use crate::services::dispatcher::{DispatchOutcome, Dispatcher};
use crate::services::logger::{LogLevel, Logger};
use crate::services::renderer::RenderedOutput;
use crate::utils::redact::redact_value;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "ispw-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn map_tool_error(tool: &str, error: &ToolError) -> McpError {
    let mut lines = vec![
        "IspwError".to_string(),
        format!("tool: {}", tool),
        format!("category: {}", error.category.as_str()),
        format!("code: {}", error.code),
        format!("retryable: {}", error.retryable),
        format!("message: {}", error.message),
    ];
    if let Some(status) = error.status {
        lines.push(format!("status: {}", status));
    }
    if let Some(hint) = &error.hint {
        lines.push(format!("hint: {}", hint));
    }
    let message = lines.join("\n");

    let code = match error.category {
        ErrorCategory::InputInvalid => ErrorCode::InvalidParams,
        ErrorCategory::Timeout => ErrorCode::RequestTimeout,
        _ => ErrorCode::InternalError,
    };
    let mapped = McpError::new(code, message);
    match serde_json::to_value(error) {
        Ok(data) => mapped.with_data(redact_value(&data, usize::MAX, &[])),
        Err(_) => mapped,
    }
}

fn tool_result(outcome: &DispatchOutcome) -> Value {
    let mut result = serde_json::json!({
        "content": [{"type": "text", "text": outcome.output.to_display_string()}],
        "_meta": outcome.meta(),
    });
    if let (RenderedOutput::Structured(value), Some(map)) =
        (&outcome.output, result.as_object_mut())
    {
        // structuredContent must be an object; bare arrays are wrapped.
        let structured = if value.is_object() {
            value.clone()
        } else {
            serde_json::json!({ "items": value })
        };
        map.insert("structuredContent".to_string(), structured);
    }
    result
}

#[derive(Clone)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    logger: Logger,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, logger: Logger) -> Self {
        Self {
            dispatcher,
            logger: logger.child("mcp"),
        }
    }

    pub fn from_app(app: &App) -> Self {
        Self::new(app.dispatcher.clone(), app.logger.clone())
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": tool_defs() })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, McpError> {
        let params: ToolCallParams = serde_json::from_value(params).map_err(|err| {
            McpError::new(
                ErrorCode::InvalidParams,
                format!("Invalid tools/call params: {}", err),
            )
        })?;
        let name = params.name.trim();
        if name.is_empty() {
            return Err(McpError::new(ErrorCode::InvalidParams, "Missing tool name"));
        }
        match self.dispatcher.dispatch(name, params.arguments).await {
            Ok(outcome) => Ok(tool_result(&outcome)),
            Err(err) => {
                self.logger.info(
                    "tool call failed",
                    Some(&serde_json::json!({
                        "tool": name,
                        "category": err.category.as_str(),
                        "status": err.status,
                    })),
                );
                Err(map_tool_error(name, &err))
            }
        }
    }

    /// Handles one inbound line; `None` when no response is due.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError.as_i32(),
                    "Parse error".to_string(),
                ))
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(req) => req,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request".to_string(),
                ))
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id?;
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            method if method.starts_with("notifications/") => {
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => match self.handle_tools_call(request.params).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => {
                    JsonRpcResponse::failure_with_data(id, err.code.as_i32(), err.message, err.data)
                }
            },
            _ => JsonRpcResponse::failure(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                "Method not found".to_string(),
            ),
        };
        Some(response)
    }

    /// Serves line-delimited JSON-RPC until the reader closes. Each request
    /// runs on its own task; only the writes to `output` are serialized.
    pub async fn serve<R, W>(&self, input: R, output: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            let mut writer = BufWriter::new(output);
            while let Some(payload) = rx.recv().await {
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            writer.shutdown().await?;
            Ok::<(), std::io::Error>(())
        });

        let mut reader = BufReader::new(input).lines();
        let mut tasks = Vec::new();
        while let Some(line) = reader.next_line().await? {
            let server = self.clone();
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                if let Some(response) = server.handle_line(&line).await {
                    match serde_json::to_string(&response) {
                        Ok(payload) => {
                            let _ = tx.send(payload);
                        }
                        Err(err) => server.logger.error(
                            "failed to serialize response",
                            Some(&serde_json::json!({ "error": err.to_string() })),
                        ),
                    }
                }
            }));
            tasks.retain(|task| !task.is_finished());
        }

        for task in tasks {
            let _ = task.await;
        }
        drop(tx);
        match writer.await {
            Ok(result) => result.map_err(McpError::from),
            Err(err) => Err(McpError::new(
                ErrorCode::InternalError,
                format!("response writer stopped: {}", err),
            )),
        }
    }

    pub async fn run_stdio(&self) -> Result<(), McpError> {
        self.logger.info("listening on stdio", None);
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}

pub async fn run_stdio(
    overrides: ConfigOverrides,
    log_level: Option<LogLevel>,
) -> Result<(), McpError> {
    let app = App::initialize(overrides, log_level).map_err(|err| {
        let mut message = format!("configuration error: {}", err.message);
        if let Some(hint) = err.hint.as_ref() {
            message.push_str(&format!(" ({})", hint));
        }
        McpError::new(ErrorCode::InvalidParams, message)
    })?;
    McpServer::from_app(&app).run_stdio().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_map_to_json_rpc_codes() {
        let cases = [
            (ToolError::input_invalid("bad"), ErrorCode::InvalidParams),
            (ToolError::timeout("slow"), ErrorCode::RequestTimeout),
            (ToolError::not_found("gone"), ErrorCode::InternalError),
            (ToolError::upstream("down"), ErrorCode::InternalError),
        ];
        for (err, code) in cases {
            assert_eq!(map_tool_error("ispw_x", &err).code, code);
        }
    }

    #[test]
    fn mapped_message_lists_category_code_and_hint() {
        let err = ToolError::authentication("denied")
            .with_hint("check the token")
            .with_status(401);
        let mapped = map_tool_error("ispw_get_assignment", &err);
        assert!(mapped.message.contains("tool: ispw_get_assignment"));
        assert!(mapped.message.contains("category: authentication_failure"));
        assert!(mapped.message.contains("code: AUTHENTICATION_FAILURE"));
        assert!(mapped.message.contains("status: 401"));
        assert!(mapped.message.contains("hint: check the token"));
    }

    #[test]
    fn mapped_error_carries_details_as_data() {
        let err = ToolError::invalid_field("level", "enum", "bad level")
            .with_hint("use DEV, INT, ACC or PRD");
        let mapped = map_tool_error("ispw_list_assignments", &err);
        let data = mapped.data.expect("data");
        assert_eq!(data["category"], "input_invalid");
        assert_eq!(data["details"]["field"], "level");
        assert_eq!(data["details"]["constraint"], "enum");
        assert_eq!(data["hint"], "use DEV, INT, ACC or PRD");
    }
}
