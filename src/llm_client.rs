//! Shared OpenAI-compatible chat completion client.
//!
//! Every component that needs an LLM call (curation summarization,
//! ambiguous-framework disambiguation, task breakdown) goes through this
//! one client rather than rolling its own `reqwest` plumbing. The retry
//! loop with exponential backoff and the request/response shapes follow
//! a small retry-with-backoff pattern, generalized to whatever
//! `base_url`/`model` the configuration points at.

use crate::config::LlmConfig;
use crate::error::{PromptMcpError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_RETRIES: usize = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 500;

pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub content: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.api_key.is_some()
    }

    /// Ask the model to answer `prompt` with a system instruction steering
    /// it toward the caller's task. Retries transient failures with
    /// exponential backoff; a non-retryable absence of credentials fails
    /// fast without attempting the network.
    pub async fn complete(
        &self,
        stage: &'static str,
        system: &str,
        prompt: &str,
    ) -> Result<LlmCompletion> {
        let api_key = self.config.api_key.as_ref().ok_or(PromptMcpError::UpstreamUnavailable { stage })?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt as u32));
                debug!(stage, attempt, ?delay, "retrying llm call");
                tokio::time::sleep(delay).await;
            }

            match self.call_once(api_key, system, prompt).await {
                Ok(completion) => {
                    info!(
                        stage,
                        prompt_tokens = completion.prompt_tokens,
                        completion_tokens = completion.completion_tokens,
                        "llm call succeeded"
                    );
                    return Ok(completion);
                }
                Err(e) => {
                    warn!(stage, attempt, error = %e, "llm call failed");
                    last_error = Some(e);
                }
            }
        }

        let _ = last_error;
        Err(PromptMcpError::UpstreamUnavailable { stage })
    }

    async fn call_once(&self, api_key: &str, system: &str, prompt: &str) -> anyhow::Result<LlmCompletion> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("llm endpoint returned {status}: {body}");
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("llm response had no choices"))?;

        Ok(LlmCompletion {
            content: choice.message.content,
            prompt_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            completion_tokens: parsed.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_api_key() {
        let cfg = LlmConfig {
            enabled: true,
            api_key: None,
            ..LlmConfig::default()
        };
        let client = LlmClient::new(cfg);
        assert!(!client.is_enabled());
    }

    #[test]
    fn enabled_with_key_and_flag() {
        let cfg = LlmConfig {
            enabled: true,
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(cfg);
        assert!(client.is_enabled());
    }
}
