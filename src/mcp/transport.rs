//! Line-delimited JSON-RPC transport over stdio.
//!
//! One JSON object per line on stdin, one per line on stdout, blank
//! lines skipped. A `MemoryTransport` variant backs the dispatcher's own
//! tests.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn receive(&mut self) -> anyhow::Result<Option<JsonRpcRequest>>;
    async fn send(&mut self, response: JsonRpcResponse) -> anyhow::Result<()>;
}

pub struct StdioTransport {
    stdin: BufReader<Stdin>,
    stdout: Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn receive(&mut self) -> anyhow::Result<Option<JsonRpcRequest>> {
        loop {
            let mut line = String::new();
            let bytes_read = self.stdin.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return match serde_json::from_str(trimmed) {
                Ok(request) => Ok(Some(request)),
                Err(e) => {
                    let error_response = JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error());
                    self.send(error_response).await?;
                    Err(anyhow::anyhow!("failed to parse json-rpc request: {e}"))
                }
            };
        }
    }

    async fn send(&mut self, response: JsonRpcResponse) -> anyhow::Result<()> {
        let json = serde_json::to_string(&response)?;
        self.stdout.write_all(json.as_bytes()).await?;
        self.stdout.write_all(b"\n").await?;
        self.stdout.flush().await?;
        Ok(())
    }
}

/// In-memory transport used by the dispatcher's own unit tests.
#[derive(Default)]
pub struct MemoryTransport {
    requests: std::collections::VecDeque<JsonRpcRequest>,
    responses: Vec<JsonRpcResponse>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_request(&mut self, request: JsonRpcRequest) {
        self.requests.push_back(request);
    }

    pub fn responses(&self) -> &[JsonRpcResponse] {
        &self.responses
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(&mut self) -> anyhow::Result<Option<JsonRpcRequest>> {
        Ok(self.requests.pop_front())
    }

    async fn send(&mut self, response: JsonRpcResponse) -> anyhow::Result<()> {
        self.responses.push(response);
        Ok(())
    }
}
