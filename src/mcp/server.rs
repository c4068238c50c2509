//! Routes JSON-RPC 2.0 frames onto the `enhance` orchestrator.
//!
//! `tools/list` returns a single static `ToolDescriptor` for
//! `promptmcp.enhance`; `tools/call` validates its arguments against the
//! tool's input schema and hands them to `EnhanceOrchestrator`.
//! Everything else is `-32601`. Malformed params are `-32602`. Any
//! uncaught failure is sanitized into `-32000`: only this boundary is
//! allowed to produce a tool error.

use super::protocol::{
    ContentBlock, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, McpTool, RequestId, ServerCapabilities, ServerInfo, ToolCallParams,
    ToolCallResult, ToolsListResult, MCP_PROTOCOL_VERSION,
};
use super::transport::Transport;
use crate::model::{EnhanceContext, Prompt};
use crate::orchestrator::{EnhanceOptions, EnhanceOrchestrator};
use serde_json::Value;
use tracing::{debug, error, info, warn};

pub const TOOL_NAME: &str = "promptmcp.enhance";
const SERVER_NAME: &str = "promptmcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer {
    orchestrator: EnhanceOrchestrator,
}

impl McpServer {
    pub fn new(orchestrator: EnhanceOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Read requests from `transport` until it reports EOF (`receive`
    /// returns `None`), dispatching each to `handle_request` in turn.
    pub async fn run(&self, transport: &mut dyn Transport) -> anyhow::Result<()> {
        loop {
            match transport.receive().await {
                Ok(Some(request)) => {
                    let response = self.handle_request(request).await;
                    transport.send(response).await?;
                }
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "failed to read request, continuing");
                }
            }
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        debug!(method = %request.method, "dispatching rpc request");

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            _ => JsonRpcResponse::error(id, JsonRpcError::method_not_found()),
        }
    }

    fn handle_initialize(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let parsed: InitializeParams = match params {
            Some(value) => match serde_json::from_value(value) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, JsonRpcError::invalid_params(format!("invalid initialize params: {e}")));
                }
            },
            None => InitializeParams {
                protocol_version: MCP_PROTOCOL_VERSION.to_string(),
                client_info: None,
            },
        };

        if let Some(client) = parsed.client_info {
            info!(client = %client.name, version = %client.version, "mcp client initialized");
        } else {
            info!(client = "unknown", "mcp client initialized");
        }

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };
        JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: vec![McpTool {
                name: TOOL_NAME.to_string(),
                description: "Enrich a raw prompt with framework documentation, project facts, \
                              code snippets, outstanding todos, and an optional task breakdown."
                    .to_string(),
                input_schema: enhance_input_schema(),
            }],
        };
        JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(value) => value,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params("missing params")),
        };

        let call: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params(format!("invalid tools/call params: {e}")));
            }
        };

        if call.name != TOOL_NAME {
            return JsonRpcResponse::error(id, JsonRpcError::method_not_found());
        }

        match self.call_enhance(call.arguments).await {
            Ok(response_json) => {
                let text = serde_json::to_string_pretty(&response_json).unwrap_or_default();
                let result = ToolCallResult {
                    content: vec![ContentBlock::text(text)],
                    is_error: None,
                };
                JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            Err(err) => {
                error!(error = %err, "enhance tool call failed");
                JsonRpcResponse::error(id, JsonRpcError::new(err.rpc_code(), err.sanitized_message()))
            }
        }
    }

    async fn call_enhance(&self, arguments: Value) -> Result<Value, crate::error::PromptMcpError> {
        let prompt_text = arguments
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::error::PromptMcpError::Validation("`prompt` is required".to_string()))?;
        let prompt = Prompt::new(prompt_text)?;

        let context: EnhanceContext = match arguments.get("context") {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                crate::error::PromptMcpError::Validation(format!("invalid `context`: {e}"))
            })?,
            None => EnhanceContext::default(),
        };

        let options: EnhanceOptions = match arguments.get("options") {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                crate::error::PromptMcpError::Validation(format!("invalid `options`: {e}"))
            })?,
            None => EnhanceOptions::default(),
        };

        let response = self.orchestrator.enhance(prompt, context, options).await;
        Ok(serde_json::to_value(response).unwrap_or(Value::Null))
    }
}

fn enhance_input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "prompt": { "type": "string", "minLength": 1 },
            "context": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "framework": { "type": "string" },
                    "style": { "type": "string" },
                    "projectId": { "type": "string" }
                }
            },
            "options": {
                "type": "object",
                "properties": {
                    "useCache": { "type": "boolean" },
                    "maxTokens": { "type": "integer", "minimum": 1 },
                    "includeMetadata": { "type": "boolean" },
                    "includeBreakdown": { "type": "boolean" },
                    "maxTasks": { "type": "integer", "minimum": 1 },
                    "useAIEnhancement": { "type": "boolean" },
                    "enhancementStrategy": {
                        "type": "string",
                        "enum": ["framework-specific", "quality-focused", "project-aware", "general"]
                    },
                    "qualityFocus": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["accessibility", "performance", "security", "testing"]
                        }
                    }
                }
            }
        },
        "required": ["prompt"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakdownSettings, CacheSettings, ConcurrencySettings, Context7Config, CuratorSettings, ProjectAnalyzerSettings};
    use crate::context7_client::Context7Client;
    use crate::doc_curator::DocumentationCurator;
    use crate::project_analyzer::ProjectAnalyzer;
    use crate::prompt_cache::PromptCache;
    use crate::task_breakdown::TaskBreakdownEngine;
    use crate::mcp::transport::MemoryTransport;
    use crate::todo_store::TodoStore;

    async fn test_server() -> (McpServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = PromptCache::open(&dir.path().join("cache.db"), CacheSettings::default()).await;
        let context7 = Context7Client::new(Context7Config { enabled: false, ..Context7Config::default() });
        let curator = DocumentationCurator::new(CuratorSettings::default());
        let analyzer = ProjectAnalyzer::new(dir.path(), ProjectAnalyzerSettings::default());
        let todos = TodoStore::open(&dir.path().join("todos.db")).await.unwrap();
        let breakdown_engine = TaskBreakdownEngine::new(BreakdownSettings::default());
        let orchestrator = EnhanceOrchestrator::new(
            cache,
            context7,
            curator,
            analyzer,
            todos,
            None,
            breakdown_engine,
            ConcurrencySettings::default(),
            4,
            std::time::Duration::from_secs(10),
            4000,
        );
        (McpServer::new(orchestrator), dir)
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (server, _dir) = test_server().await;
        let response = server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(1),
                method: "resources/list".to_string(),
                params: None,
            })
            .await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_list_advertises_enhance() {
        let (server, _dir) = test_server().await;
        let response = server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(1),
                method: "tools/list".to_string(),
                params: None,
            })
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["tools"][0]["name"], TOOL_NAME);
    }

    #[tokio::test]
    async fn tools_call_with_empty_prompt_is_invalid_params() {
        let (server, _dir) = test_server().await;
        let response = server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(1),
                method: "tools/call".to_string(),
                params: Some(serde_json::json!({
                    "name": TOOL_NAME,
                    "arguments": { "prompt": "" }
                })),
            })
            .await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn tools_call_with_unknown_tool_name_is_method_not_found() {
        let (server, _dir) = test_server().await;
        let response = server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(1),
                method: "tools/call".to_string(),
                params: Some(serde_json::json!({
                    "name": "some.other.tool",
                    "arguments": {}
                })),
            })
            .await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_call_enhance_succeeds_end_to_end() {
        let (server, _dir) = test_server().await;
        let response = server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(7),
                method: "tools/call".to_string(),
                params: Some(serde_json::json!({
                    "name": TOOL_NAME,
                    "arguments": { "prompt": "How do I center a div?" }
                })),
            })
            .await;
        let result = response.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("How do I center a div?"));
    }

    #[tokio::test]
    async fn run_loop_drains_memory_transport_until_eof() {
        let (server, _dir) = test_server().await;
        let mut transport = MemoryTransport::new();
        transport.push_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(1),
            method: "tools/list".to_string(),
            params: None,
        });
        server.run(&mut transport).await.unwrap();
        assert_eq!(transport.responses().len(), 1);
    }
}
