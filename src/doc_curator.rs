//! LLM-backed documentation curation.
//!
//! Three LLM calls per document — quality score, extraction, compression —
//! each a single deterministic structured-output call. The curated result
//! is cached, keyed and TTL'd by a SHA-256 content hash. Any failure,
//! timeout, or sub-floor score falls back to the original documentation
//! verbatim; the orchestrator must never see an error from this component.

use crate::config::CuratorSettings;
use crate::llm_client::LlmClient;
use crate::model::{CuratedContent, CurationMeta, Documentation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct CacheEntry {
    content: CuratedContent,
    expires_at: Instant,
}

pub struct DocumentationCurator {
    settings: CuratorSettings,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl DocumentationCurator {
    pub fn new(settings: CuratorSettings) -> Self {
        Self {
            settings,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Curate one document, keyed by `(libraryId, topic, promptFingerprint)`.
    pub async fn curate(
        &self,
        doc: &Documentation,
        prompt: &str,
        llm: Option<&LlmClient>,
    ) -> CuratedContent {
        if doc.is_empty() {
            return CuratedContent::verbatim(doc.clone(), 0.0);
        }

        let key = self.cache_key(doc, prompt);
        if let Some(cached) = self.cache_get(&key).await {
            return cached;
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.settings.per_document_deadline,
            self.curate_inner(doc, prompt, llm),
        )
        .await
        {
            Ok(Some(curated)) => curated,
            Ok(None) => CuratedContent::verbatim(doc.clone(), 0.0),
            Err(_) => {
                warn!(library_id = %doc.library_id, "curator deadline exceeded, returning original");
                CuratedContent::verbatim(doc.clone(), 0.0)
            }
        };

        let mut result = result;
        result.meta.processing_millis = started.elapsed().as_millis() as u64;

        self.cache_put(key, result.clone()).await;
        result
    }

    async fn curate_inner(
        &self,
        doc: &Documentation,
        prompt: &str,
        llm: Option<&LlmClient>,
    ) -> Option<CuratedContent> {
        let llm = llm.filter(|c| c.is_enabled())?;

        let quality_score = self.assess_quality(doc, prompt, llm).await;
        if quality_score < self.settings.quality_floor {
            return Some(CuratedContent::verbatim(doc.clone(), quality_score));
        }

        let (key_patterns, best_practices, code_examples) = self.extract(doc, llm).await;
        let compressed = self.compress(doc, llm).await;

        let output_tokens = crate::model::estimate_tokens(&compressed);
        let token_reduction = CuratedContent::token_reduction(doc.tokens, output_tokens);

        Some(CuratedContent {
            original: doc.clone(),
            content: compressed,
            quality_score,
            token_reduction,
            key_patterns,
            best_practices,
            code_examples,
            meta: CurationMeta {
                input_tokens: doc.tokens,
                output_tokens,
                processing_millis: 0,
                confidence: 0.7,
            },
        })
    }

    async fn assess_quality(&self, doc: &Documentation, prompt: &str, llm: &LlmClient) -> f64 {
        let system = "Score this documentation from 0 to 10, weighting code examples 30%, \
            best practices 25%, relevance to the user's prompt 25%, completeness 20%. \
            Reply with ONLY a single number.";
        let request = format!("Prompt: {prompt}\n\nDocumentation:\n{}", truncate(&doc.content, 4000));

        match llm.complete("curation_quality", system, &request).await {
            Ok(completion) => parse_score(&completion.content).unwrap_or(5.0),
            Err(e) => {
                debug!(error = %e, "quality assessment unavailable");
                5.0
            }
        }
    }

    async fn extract(&self, doc: &Documentation, llm: &LlmClient) -> (Vec<String>, Vec<String>, Vec<String>) {
        let system = "Extract key patterns, best practices, and code examples from this \
            documentation. Reply with ONLY JSON: {\"keyPatterns\":[...],\"bestPractices\":[...],\
            \"codeExamples\":[...]}. Keep each list under 10 items.";

        let completion = match llm.complete("curation_extract", system, &truncate(&doc.content, 6000)).await {
            Ok(c) => c,
            Err(_) => return (Vec::new(), Vec::new(), Vec::new()),
        };

        #[derive(Deserialize, Default)]
        struct Extracted {
            #[serde(default, rename = "keyPatterns")]
            key_patterns: Vec<String>,
            #[serde(default, rename = "bestPractices")]
            best_practices: Vec<String>,
            #[serde(default, rename = "codeExamples")]
            code_examples: Vec<String>,
        }

        let parsed: Extracted = serde_json::from_str(extract_json(&completion.content)).unwrap_or_default();
        (parsed.key_patterns, parsed.best_practices, parsed.code_examples)
    }

    async fn compress(&self, doc: &Documentation, llm: &LlmClient) -> String {
        let target_tokens =
            (doc.tokens as f64 * (1.0 - self.settings.target_token_reduction)).max(1.0) as usize;
        let system = format!(
            "Rewrite this documentation to approximately {target_tokens} tokens while preserving \
            all code blocks verbatim. Keep only the most relevant content."
        );

        let first_pass = match llm.complete("curation_compress", &system, &doc.content).await {
            Ok(c) => c.content,
            Err(_) => return doc.content.clone(),
        };

        if crate::model::estimate_tokens(&first_pass) <= target_tokens * 2 {
            return first_pass;
        }

        match llm.complete("curation_compress_retry", &system, &first_pass).await {
            Ok(c) if crate::model::estimate_tokens(&c.content) <= target_tokens * 2 => c.content,
            _ => truncate_at_section_boundary(&first_pass, target_tokens * 4),
        }
    }

    fn cache_key(&self, doc: &Documentation, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc.library_id.0.as_bytes());
        hasher.update(doc.topic.as_deref().unwrap_or("").as_bytes());
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    async fn cache_get(&self, key: &str) -> Option<CuratedContent> {
        let mut cache = self.cache.lock().await;
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.content.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    async fn cache_put(&self, key: String, content: CuratedContent) {
        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                content,
                expires_at: Instant::now() + self.settings.cache_ttl,
            },
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn truncate_at_section_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind("\n#") {
        Some(idx) => truncated[..idx].to_string(),
        None => truncated,
    }
}

fn parse_score(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    trimmed
        .split_whitespace()
        .next()
        .and_then(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 10.0))
}

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
    use crate::model::LibraryId;

    fn sample_doc() -> Documentation {
        Documentation {
            library_id: LibraryId("/facebook/react".to_string()),
            topic: None,
            content: "# React Hooks\nUse useState for state.".to_string(),
            tokens: 20,
            retrieved_at: chrono::Utc::now(),
            source: "context7".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_doc_is_verbatim_zero_score() {
        let curator = DocumentationCurator::new(CuratorSettings::default());
        let empty = Documentation::empty(LibraryId("/x/y".to_string()), "test");
        let result = curator.curate(&empty, "prompt", None).await;
        assert_eq!(result.quality_score, 0.0);
        assert_eq!(result.token_reduction, 0.0);
    }

    #[tokio::test]
    async fn no_llm_falls_back_to_verbatim() {
        let curator = DocumentationCurator::new(CuratorSettings::default());
        let doc = sample_doc();
        let result = curator.curate(&doc, "how do hooks work", None).await;
        assert_eq!(result.content, doc.content);
        assert_eq!(result.token_reduction, 0.0);
    }

    #[test]
    fn parse_score_handles_plain_number() {
        assert_eq!(parse_score("7.5"), Some(7.5));
        assert_eq!(parse_score("Score: 9\n"), None);
        assert_eq!(parse_score("11"), Some(10.0));
    }

    #[test]
    fn section_boundary_truncation_cuts_at_heading() {
        let text = "intro text here\n# Section Two\nmore content that goes on for a while";
        let truncated = truncate_at_section_boundary(text, 30);
        assert!(!truncated.contains("Section Two"));
    }
}
