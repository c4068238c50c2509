//! Shared data model for the enhancement pipeline.
//!
//! These are closed record types shared across components: plain serde
//! structs with invariants enforced by constructors, not open-ended maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The raw user prompt. Non-empty, UTF-8, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt(String);

impl Prompt {
    /// Build a `Prompt`, rejecting empty or whitespace-only text.
    pub fn new(text: impl Into<String>) -> Result<Self, crate::error::PromptMcpError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(crate::error::PromptMcpError::Validation(
                "prompt must not be empty".to_string(),
            ));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

/// Optional caller-supplied hints for a single `enhance` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhanceContext {
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, rename = "projectId")]
    pub project_id: Option<String>,
}

/// Method by which a `FrameworkDetectionResult` was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Pattern,
    Keyword,
    Ai,
    Project,
    Hybrid,
    Fallback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkDetectionResult {
    pub frameworks: Vec<String>,
    pub confidence: f64,
    pub method: Option<DetectionMethod>,
    pub suggestions: Vec<String>,
}

impl FrameworkDetectionResult {
    pub fn empty(method: DetectionMethod) -> Self {
        Self {
            frameworks: Vec::new(),
            confidence: 0.0,
            method: Some(method),
            suggestions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertiseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStrategy {
    Minimal,
    Standard,
    Comprehensive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PromptComplexity {
    pub level: ComplexityLevel,
    pub expertise: ExpertiseLevel,
    pub strategy: ResponseStrategy,
    pub estimated_tokens: usize,
    pub confidence: f64,
}

/// Opaque library identifier assigned by Context7 (e.g. `/owner/repo`).
/// Treated as an unparsed token — never split, parsed, or pattern-matched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryId(pub String);

impl std::fmt::Display for LibraryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryHandle {
    pub library_id: LibraryId,
    pub name: String,
    pub description: String,
    pub trust_score: f64,
    pub code_snippets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Documentation {
    pub library_id: LibraryId,
    pub topic: Option<String>,
    pub content: String,
    pub tokens: usize,
    pub retrieved_at: DateTime<Utc>,
    pub source: String,
}

impl Documentation {
    /// An empty documentation result, used for misses and degraded fetches.
    pub fn empty(library_id: LibraryId, source: impl Into<String>) -> Self {
        Self {
            library_id,
            topic: None,
            content: String::new(),
            tokens: 0,
            retrieved_at: Utc::now(),
            source: source.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationMeta {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub processing_millis: u64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedContent {
    pub original: Documentation,
    pub content: String,
    pub quality_score: f64,
    pub token_reduction: f64,
    pub key_patterns: Vec<String>,
    pub best_practices: Vec<String>,
    pub code_examples: Vec<String>,
    pub meta: CurationMeta,
}

impl CuratedContent {
    /// Compute `token_reduction` from input/output token counts, clamped to [0, 1].
    pub fn token_reduction(input_tokens: usize, output_tokens: usize) -> f64 {
        if input_tokens == 0 {
            return 0.0;
        }
        (1.0 - (output_tokens as f64 / input_tokens as f64)).clamp(0.0, 1.0)
    }

    /// Wrap raw documentation verbatim, as required when curation quality
    /// falls below the configured floor or curation otherwise fails.
    pub fn verbatim(original: Documentation, quality_score: f64) -> Self {
        let tokens = original.tokens;
        Self {
            original: original.clone(),
            content: original.content,
            quality_score,
            token_reduction: 0.0,
            key_patterns: Vec::new(),
            best_practices: Vec::new(),
            code_examples: Vec::new(),
            meta: CurationMeta {
                input_tokens: tokens,
                output_tokens: tokens,
                processing_millis: 0,
                confidence: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    #[serde(rename = "file")]
    pub file_path: String,
    pub content: String,
    pub relevance: f64,
}

pub type RepoFacts = Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
            TodoStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => TodoStatus::InProgress,
            "completed" => TodoStatus::Completed,
            "cancelled" => TodoStatus::Cancelled,
            _ => TodoStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl TodoPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoPriority::Critical => "critical",
            TodoPriority::High => "high",
            TodoPriority::Medium => "medium",
            TodoPriority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "critical" => TodoPriority::Critical,
            "high" => TodoPriority::High,
            "low" => TodoPriority::Low,
            _ => TodoPriority::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TodoStatus,
    pub priority: TodoPriority,
    pub category: String,
    pub estimated_hours: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub parent_task_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TodoStatus,
    pub estimated_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: String,
    pub depends_on_task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub id: String,
    pub project_id: String,
    pub original_prompt: String,
    pub main_tasks: Vec<Todo>,
    pub subtasks: Vec<Subtask>,
    pub dependencies: Vec<TaskDependency>,
    pub created_at: DateTime<Utc>,
}

/// A raw, not-yet-validated breakdown as returned by the LLM, keyed by
/// titles rather than ids (see `task_breakdown::RawBreakdown`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBreakdownResult {
    pub main_tasks: Vec<Todo>,
    pub subtasks: Vec<Subtask>,
    pub dependencies: Vec<TaskDependency>,
    #[serde(rename = "estimatedTotalTime", with = "estimated_total_time")]
    pub estimated_total_hours: f64,
    pub success: bool,
}

/// Renders `estimated_total_hours` as the `"<N>h"`/`"<N>h <M>m"` string the
/// wire contract expects, rather than the raw float used internally.
mod estimated_total_time {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hours: &f64, s: S) -> Result<S::Ok, S::Error> {
        let total_minutes = (hours * 60.0).round() as i64;
        let (h, m) = (total_minutes / 60, total_minutes % 60);
        let rendered = if m == 0 { format!("{h}h") } else { format!("{h}h {m}m") };
        s.serialize_str(&rendered)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let raw = String::deserialize(d)?;
        let mut hours = 0.0;
        for part in raw.split_whitespace() {
            if let Some(h) = part.strip_suffix('h') {
                hours += h.parse::<f64>().unwrap_or(0.0);
            } else if let Some(m) = part.strip_suffix('m') {
                hours += m.parse::<f64>().unwrap_or(0.0) / 60.0;
            }
        }
        Ok(hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUsed {
    pub repo_facts: Vec<String>,
    pub code_snippets: Vec<CodeSnippet>,
    pub context7_docs: Vec<String>,
    pub todos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurationMetrics {
    pub total_token_reduction: f64,
    pub average_quality_score: f64,
    pub curation_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedResponse {
    pub enhanced_prompt: String,
    pub context_used: ContextUsed,
    pub frameworks_detected: Vec<String>,
    pub curation_metrics: Option<CurationMetrics>,
    pub breakdown: Option<TaskBreakdownResult>,
    pub success: bool,
}

/// A durable cache entry. `expires_at > created_at` and
/// `last_accessed >= created_at` are enforced by the constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: EnhancedResponse,
    pub frameworks: Vec<String>,
    pub quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub hits: u64,
    pub expires_at: DateTime<Utc>,
}

/// Canonical JSON used as an input to fingerprinting: a `BTreeMap` ensures
/// key order is stable regardless of construction order.
pub fn canonical_json(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let sorted: BTreeMap<String, serde_json::Value> =
                    map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                serde_json::to_value(sorted).unwrap_or(serde_json::Value::Null)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).unwrap_or_default()
}

/// Estimate token count the way the rest of the pipeline does when no
/// tokenizer is available: `ceil(len / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    let len = text.chars().count();
    (len + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_rejects_empty() {
        assert!(Prompt::new("").is_err());
        assert!(Prompt::new("   ").is_err());
        assert!(Prompt::new("hello").is_ok());
    }

    #[test]
    fn token_reduction_clamped() {
        assert_eq!(CuratedContent::token_reduction(100, 200), 0.0);
        assert_eq!(CuratedContent::token_reduction(100, 0), 1.0);
        assert!((CuratedContent::token_reduction(100, 30) - 0.7).abs() < 1e-9);
        assert_eq!(CuratedContent::token_reduction(0, 0), 0.0);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}
