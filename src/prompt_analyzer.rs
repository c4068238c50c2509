//! Prompt-complexity classification and response-strategy selection.
//!
//! The heuristic pass is always available and never fails; it scores
//! complexity with a simple keyword-bucket pass over the prompt. The
//! optional AI pass asks the shared `LlmClient` for a structured complexity
//! object and only raises the heuristic's confidence, never lowers it.

use crate::llm_client::LlmClient;
use crate::model::{ComplexityLevel, ExpertiseLevel, PromptComplexity, ResponseStrategy};
use serde::Deserialize;
use tracing::{debug, warn};

const TECHNICAL_KEYWORDS: &[&str] = &[
    "component", "authentication", "async", "database", "api", "endpoint",
    "schema", "middleware", "hook", "state", "reducer", "query", "mutation",
    "websocket", "socket", "cache", "token", "session", "route", "router",
    "migration", "index", "transaction", "thread", "concurrency", "docker",
    "kubernetes", "deploy", "ci", "test", "mock", "validate", "sanitize",
];

/// Classify a raw prompt into a `PromptComplexity`. Never fails.
pub async fn analyze(prompt: &str, llm: Option<&LlmClient>) -> PromptComplexity {
    let heuristic = heuristic_complexity(prompt);

    let Some(llm) = llm.filter(|c| c.is_enabled()) else {
        return heuristic;
    };

    match ai_complexity(prompt, llm).await {
        Some(ai) => PromptComplexity {
            confidence: heuristic.confidence.max(ai.confidence),
            ..ai
        },
        None => heuristic,
    }
}

fn heuristic_complexity(prompt: &str) -> PromptComplexity {
    let lower = prompt.to_lowercase();
    let tokens: Vec<&str> = prompt.split_whitespace().collect();
    let token_count = tokens.len();

    let technical_hits = TECHNICAL_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();

    let enumeration = has_enumeration(prompt);
    let technology_count = count_named_technologies(&lower);

    let (level, expertise, strategy, estimated_tokens) =
        if token_count <= 12 && technical_hits <= 1 && !enumeration {
            (
                ComplexityLevel::Simple,
                ExpertiseLevel::Beginner,
                ResponseStrategy::Minimal,
                100,
            )
        } else if token_count >= 40 || technology_count >= 3 || enumeration {
            (
                ComplexityLevel::Complex,
                ExpertiseLevel::Advanced,
                ResponseStrategy::Comprehensive,
                800,
            )
        } else {
            (
                ComplexityLevel::Medium,
                ExpertiseLevel::Intermediate,
                ResponseStrategy::Standard,
                350,
            )
        };

    PromptComplexity {
        level,
        expertise,
        strategy,
        estimated_tokens,
        confidence: 0.6,
    }
}

fn has_enumeration(prompt: &str) -> bool {
    let sentence_count = prompt
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let comma_separated_items = prompt.matches(',').count();
    let bullet_like = prompt.contains('\n') && (prompt.contains("- ") || prompt.contains("* "));

    sentence_count > 1 || comma_separated_items >= 2 || bullet_like
}

const NAMED_TECHNOLOGIES: &[&str] = &[
    "react", "vue", "angular", "svelte", "next.js", "nuxt", "typescript",
    "javascript", "python", "rust", "go", "java", "express", "fastapi",
    "django", "flask", "mongodb", "postgresql", "mysql", "redis", "tailwind",
    "graphql", "docker", "kubernetes", "aws", "azure", "gcp",
];

fn count_named_technologies(lower_prompt: &str) -> usize {
    NAMED_TECHNOLOGIES
        .iter()
        .filter(|tech| lower_prompt.contains(*tech))
        .count()
}

#[derive(Debug, Deserialize)]
struct AiComplexity {
    level: ComplexityLevel,
    expertise: ExpertiseLevel,
    strategy: ResponseStrategy,
    #[serde(rename = "estimatedTokens")]
    estimated_tokens: usize,
    confidence: f64,
}

async fn ai_complexity(prompt: &str, llm: &LlmClient) -> Option<PromptComplexity> {
    let system = "You classify developer prompts. Return ONLY a JSON object: \
        {\"level\":\"simple|medium|complex\",\"expertise\":\"beginner|intermediate|advanced\",\
        \"strategy\":\"minimal|standard|comprehensive\",\"estimatedTokens\":<int>,\"confidence\":<0..1>}.";

    let completion = match llm.complete("prompt_analysis", system, prompt).await {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "prompt complexity ai pass unavailable, falling back to heuristic");
            return None;
        }
    };

    match serde_json::from_str::<AiComplexity>(extract_json(&completion.content)) {
        Ok(parsed) => Some(PromptComplexity {
            level: parsed.level,
            expertise: parsed.expertise,
            strategy: parsed.strategy,
            estimated_tokens: parsed.estimated_tokens,
            confidence: parsed.confidence.clamp(0.0, 1.0),
        }),
        Err(e) => {
            warn!(error = %e, "failed to parse ai complexity response, falling back to heuristic");
            None
        }
    }
}

/// Best-effort extraction of a JSON object from a chat completion that may
/// wrap it in prose or a code fence.
fn extract_json(text: &str) -> &str {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &text[s..=e],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_prompt_is_simple() {
        let result = analyze("How do I create a button?", None).await;
        assert_eq!(result.level, ComplexityLevel::Simple);
        assert_eq!(result.strategy, ResponseStrategy::Minimal);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn long_multi_tech_prompt_is_complex() {
        let prompt = "Build a full-stack application with user authentication, \
            real-time chat, and file upload using Next.js, TypeScript, and PostgreSQL";
        let result = analyze(prompt, None).await;
        assert_eq!(result.level, ComplexityLevel::Complex);
        assert_eq!(result.expertise, ExpertiseLevel::Advanced);
    }

    #[tokio::test]
    async fn medium_prompt_in_between() {
        let prompt = "Help me add authentication middleware to validate incoming API requests \
            and cache the session token for each route";
        let result = analyze(prompt, None).await;
        assert_eq!(result.level, ComplexityLevel::Medium);
    }

    #[test]
    fn extract_json_strips_surrounding_prose() {
        let text = "here you go:\n{\"a\": 1}\nhope that helps";
        assert_eq!(extract_json(text), "{\"a\": 1}");
    }
}
