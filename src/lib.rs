//! # PromptMCP — local developer-assist MCP service
//!
//! Exposes a single `enhance` operation over JSON-RPC 2.0 on stdio. Given a
//! raw prompt and optional hints, it returns an enriched prompt that fuses
//! external framework documentation (Context7), project-local facts and code
//! snippets, outstanding todos, and an optional AI-generated task breakdown —
//! all under a configurable token budget.
//!
//! ## Layout
//!
//! - [`config`] / [`error`] / [`model`] / [`telemetry`] — ambient stack
//!   shared by every component.
//! - [`llm_client`] — shared OpenAI-compatible chat-completion client.
//! - [`project_analyzer`], [`context7_client`], [`doc_curator`],
//!   [`framework_detector`], [`prompt_analyzer`], [`prompt_cache`],
//!   [`response_builder`], [`task_breakdown`], [`todo_store`] — the pipeline
//!   components.
//! - [`orchestrator`] — the `enhance` pipeline that composes all of the above.
//! - [`mcp`] — the JSON-RPC 2.0 boundary.

pub mod config;
pub mod context7_client;
pub mod doc_curator;
pub mod error;
pub mod framework_detector;
pub mod llm_client;
pub mod mcp;
pub mod model;
pub mod orchestrator;
pub mod project_analyzer;
pub mod prompt_analyzer;
pub mod prompt_cache;
pub mod response_builder;
pub mod task_breakdown;
pub mod telemetry;
pub mod todo_store;

pub use config::Config;
pub use error::{PromptMcpError, Result};
pub use mcp::McpServer;
pub use model::{
    CacheEntry, CodeSnippet, ComplexityLevel, ContextUsed, CuratedContent, CurationMeta,
    CurationMetrics, Documentation, EnhanceContext, EnhancedResponse, ExpertiseLevel,
    FrameworkDetectionResult, LibraryHandle, LibraryId, Prompt, PromptComplexity, RepoFacts,
    ResponseStrategy, Subtask, TaskBreakdownResult, TaskDependency, TaskPlan, Todo, TodoPriority,
    TodoStatus,
};
pub use orchestrator::{EnhanceOptions, EnhanceOrchestrator};
pub use prompt_cache::{CacheStats, PromptCache};
pub use todo_store::TodoStore;

/// Re-export of the crate's most commonly used types, for binaries and
/// integration tests that wire the full pipeline together.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context7_client::Context7Client;
    pub use crate::doc_curator::DocumentationCurator;
    pub use crate::error::{PromptMcpError, Result};
    pub use crate::llm_client::LlmClient;
    pub use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
    pub use crate::mcp::transport::{MemoryTransport, StdioTransport, Transport};
    pub use crate::mcp::McpServer;
    pub use crate::model::*;
    pub use crate::orchestrator::{EnhanceOptions, EnhanceOrchestrator};
    pub use crate::project_analyzer::ProjectAnalyzer;
    pub use crate::prompt_cache::PromptCache;
    pub use crate::task_breakdown::TaskBreakdownEngine;
    pub use crate::todo_store::TodoStore;
}
