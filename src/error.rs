//! Crate-wide error taxonomy.
//!
//! Each component defines its own narrow error enum (see `context7_client`,
//! `todo_store`, …) via `#[derive(thiserror::Error)]`; those convert into
//! `PromptMcpError` only at the orchestrator boundary, where a JSON-RPC
//! error code is finally decided.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptMcpError {
    /// Request did not satisfy the input schema. Surfaced as `-32602`.
    #[error("validation error: {0}")]
    Validation(String),

    /// Context7 or the LLM endpoint is unreachable or rejected auth. The
    /// stage is skipped and the pipeline continues; only surfaced to the
    /// caller if the entire pipeline produced no usable content.
    #[error("upstream unavailable: {stage}")]
    UpstreamUnavailable { stage: &'static str },

    /// Upstream returned data that didn't parse or match the expected
    /// shape. Treated as if the upstream had returned nothing.
    #[error("upstream malformed response in {stage} (fingerprint {fingerprint})")]
    UpstreamMalformed {
        stage: &'static str,
        fingerprint: String,
    },

    /// A stage exceeded its own deadline. Non-fatal unless the call's
    /// overall deadline is also exhausted.
    #[error("deadline exceeded in stage {stage}")]
    DeadlineExceeded { stage: &'static str },

    /// Durable cache tier faulted; degrade to hot-tier-only. Never
    /// surfaced to the caller.
    #[error("cache degraded: {0}")]
    CacheDegraded(String),

    /// A todo-store write was rejected (self-loop, missing parent, cycle).
    #[error("todo integrity error: {0}")]
    TodoIntegrity(String),

    /// Anything unexpected. Sanitized before it reaches the RPC caller;
    /// the full diagnostic is only ever logged.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PromptMcpError>;

impl PromptMcpError {
    /// JSON-RPC 2.0 error code this error maps to at the RPC boundary.
    pub fn rpc_code(&self) -> i32 {
        match self {
            PromptMcpError::Validation(_) => -32602,
            PromptMcpError::Internal(_) => -32000,
            // These never reach the boundary in a well-behaved pipeline —
            // the orchestrator absorbs them into a partial response — but
            // if one does leak through, treat it as a generic tool error.
            PromptMcpError::UpstreamUnavailable { .. }
            | PromptMcpError::UpstreamMalformed { .. }
            | PromptMcpError::DeadlineExceeded { .. }
            | PromptMcpError::CacheDegraded(_)
            | PromptMcpError::TodoIntegrity(_) => -32000,
        }
    }

    /// A message safe to send to the RPC caller: never includes prompt
    /// text, upstream payloads, or file paths.
    pub fn sanitized_message(&self) -> String {
        match self {
            PromptMcpError::Validation(msg) => msg.clone(),
            PromptMcpError::UpstreamUnavailable { stage } => {
                format!("upstream unavailable during {stage}")
            }
            PromptMcpError::UpstreamMalformed { stage, .. } => {
                format!("upstream returned malformed data during {stage}")
            }
            PromptMcpError::DeadlineExceeded { stage } => {
                format!("deadline exceeded during {stage}")
            }
            PromptMcpError::CacheDegraded(_) => "cache degraded".to_string(),
            PromptMcpError::TodoIntegrity(_) => "todo store rejected the write".to_string(),
            PromptMcpError::Internal(_) => "internal error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_invalid_params() {
        let err = PromptMcpError::Validation("prompt must not be empty".to_string());
        assert_eq!(err.rpc_code(), -32602);
        assert_eq!(err.sanitized_message(), "prompt must not be empty");
    }

    #[test]
    fn internal_is_sanitized() {
        let err = PromptMcpError::Internal(anyhow::anyhow!("leaked secret token xyz"));
        assert_eq!(err.rpc_code(), -32000);
        assert_eq!(err.sanitized_message(), "internal error");
    }
}
