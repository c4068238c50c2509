//! The `enhance` pipeline — the heart of the service.
//!
//! A staged dispatch over a multi-stage pipeline, built as an explicit
//! capability-record constructor: every collaborator the orchestrator
//! needs is a named field wired up once at process start, never looked
//! up by name or pulled from a shared registry.

use crate::config::ConcurrencySettings;
use crate::context7_client::Context7Client;
use crate::doc_curator::DocumentationCurator;
use crate::framework_detector;
use crate::llm_client::LlmClient;
use crate::model::{
    ComplexityLevel, CuratedContent, Documentation, EnhanceContext, EnhancedResponse, Prompt, TodoStatus,
};
use crate::project_analyzer::ProjectAnalyzer;
use crate::prompt_analyzer;
use crate::prompt_cache::{CacheKeyInput, PromptCache};
use crate::response_builder::{BuildInput, ResponseBuilder};
use crate::task_breakdown::TaskBreakdownEngine;
use crate::todo_store::TodoStore;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info_span, warn, Instrument};

const BREAKDOWN_TRIGGERS: &[&str] = &["build ", "create ", "implement ", "develop ", "application"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceOptions {
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub include_metadata: bool,
    /// `None` = auto (gated on prompt complexity and breakdown keywords).
    #[serde(default)]
    pub include_breakdown: Option<bool>,
    #[serde(default)]
    pub max_tasks: Option<usize>,
    #[serde(default = "default_true")]
    pub use_ai_enhancement: bool,
    #[serde(default)]
    pub enhancement_strategy: Option<String>,
    #[serde(default)]
    pub quality_focus: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_tokens: None,
            include_metadata: false,
            include_breakdown: None,
            max_tasks: None,
            use_ai_enhancement: true,
            enhancement_strategy: None,
            quality_focus: Vec::new(),
        }
    }
}

/// Every collaborator the pipeline needs, wired once at process start.
///
/// Collaborators are `Arc`-wrapped so the whole orchestrator is a cheap
/// clone — needed to hand a `'static` handle to the background task that
/// refreshes a soft-stale cache entry (see `spawn_soft_refresh`).
#[derive(Clone)]
pub struct EnhanceOrchestrator {
    cache: Arc<PromptCache>,
    context7: Arc<Context7Client>,
    curator: Arc<DocumentationCurator>,
    analyzer: Arc<ProjectAnalyzer>,
    todos: Arc<TodoStore>,
    llm: Option<Arc<LlmClient>>,
    breakdown_engine: Arc<TaskBreakdownEngine>,
    response_builder: ResponseBuilder,
    concurrency: ConcurrencySettings,
    context7_fan_out: usize,
    context7_stage_deadline: std::time::Duration,
    default_max_tokens: usize,
}

impl EnhanceOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: PromptCache,
        context7: Context7Client,
        curator: DocumentationCurator,
        analyzer: ProjectAnalyzer,
        todos: TodoStore,
        llm: Option<LlmClient>,
        breakdown_engine: TaskBreakdownEngine,
        concurrency: ConcurrencySettings,
        context7_fan_out: usize,
        context7_stage_deadline: std::time::Duration,
        default_max_tokens: usize,
    ) -> Self {
        Self {
            cache: Arc::new(cache),
            context7: Arc::new(context7),
            curator: Arc::new(curator),
            analyzer: Arc::new(analyzer),
            todos: Arc::new(todos),
            llm: llm.map(Arc::new),
            breakdown_engine: Arc::new(breakdown_engine),
            response_builder: ResponseBuilder::new(),
            concurrency,
            context7_fan_out,
            context7_stage_deadline,
            default_max_tokens,
        }
    }

    pub async fn enhance(&self, prompt: Prompt, context: EnhanceContext, options: EnhanceOptions) -> EnhancedResponse {
        let call = async { self.enhance_inner(prompt, context, options).await };

        match tokio::time::timeout(self.concurrency.call_deadline, call).await {
            Ok(response) => response,
            Err(_) => {
                warn!("enhance call exceeded its total deadline");
                EnhancedResponse {
                    enhanced_prompt: String::new(),
                    context_used: empty_context_used(),
                    frameworks_detected: Vec::new(),
                    curation_metrics: None,
                    breakdown: None,
                    success: false,
                }
            }
        }
    }

    async fn enhance_inner(&self, prompt: Prompt, context: EnhanceContext, options: EnhanceOptions) -> EnhancedResponse {
        let context_json = serde_json::to_value(&context).unwrap_or(serde_json::Value::Null);
        let options_json = serde_json::to_value(&options).unwrap_or(serde_json::Value::Null);
        let key = PromptCache::fingerprint(&CacheKeyInput {
            prompt: prompt.as_str(),
            context: &context_json,
            options: &options_json,
        });

        if !options.use_cache {
            return self.build(&key, prompt, context, options).await;
        }

        match self.cache.lookup(&key).await {
            Some((entry, stale)) => {
                if stale {
                    self.spawn_soft_refresh(key, prompt, context, options);
                }
                entry.value
            }
            None => self.cache.get_or_build(&key, || self.build(&key, prompt, context, options)).await,
        }
    }

    /// Kick off a rebuild for a soft-stale cache entry without making the
    /// caller wait for it. `build` stores its own result on completion, so
    /// the next lookup for this key picks up the fresh value.
    fn spawn_soft_refresh(&self, key: String, prompt: Prompt, context: EnhanceContext, options: EnhanceOptions) {
        let this = self.clone();
        tokio::spawn(
            async move {
                this.build(&key, prompt, context, options).await;
            }
            .instrument(info_span!("soft_refresh")),
        );
    }

    async fn build(&self, key: &str, prompt: Prompt, context: EnhanceContext, options: EnhanceOptions) -> EnhancedResponse {
        let project_id = context.project_id.clone().unwrap_or_else(|| "default".to_string());
        let max_tokens = options.max_tokens.unwrap_or(self.default_max_tokens);

        let complexity = prompt_analyzer::analyze(prompt.as_str(), self.llm.as_deref())
            .instrument(info_span!("analyze"))
            .await;

        let detection = tokio::time::timeout(
            self.concurrency.detection_deadline,
            framework_detector::detect(prompt.as_str(), Some(&context), &Vec::new(), self.llm.as_deref()),
        )
        .instrument(info_span!("detect_frameworks"))
        .await
        .unwrap_or_else(|_| {
            warn!("framework detection exceeded its deadline");
            crate::model::FrameworkDetectionResult::empty(crate::model::DetectionMethod::Fallback)
        });

        let ((repo_facts, snippets), todos, docs) = tokio::join!(
            self.analyzer.analyze(prompt.as_str()).instrument(info_span!("analyze_project")),
            self.list_active_todos(&project_id).instrument(info_span!("list_todos")),
            self.fetch_docs(&detection.frameworks).instrument(info_span!("fetch_docs")),
        );

        let curated_docs: Vec<CuratedContent> = if options.use_ai_enhancement {
            let mut out = Vec::with_capacity(docs.len());
            for doc in &docs {
                out.push(self.curator.curate(doc, prompt.as_str(), self.llm.as_deref()).await);
            }
            out
        } else {
            docs.iter().map(|d| CuratedContent::verbatim(d.clone(), 0.0)).collect()
        };

        let should_breakdown = self.should_breakdown(&options, complexity.level, prompt.as_str());
        let breakdown = if should_breakdown {
            let framework_docs: Vec<String> = curated_docs.iter().map(|d| d.content.clone()).collect();
            let result = self
                .breakdown_engine
                .breakdown(prompt.as_str(), &detection.frameworks, &repo_facts, &framework_docs, self.llm.as_deref(), options.max_tasks)
                .instrument(info_span!("task_breakdown"))
                .await;

            if result.success {
                if let Err(e) = self.todos.create_tasks_from_breakdown(&result, &project_id, prompt.as_str()).await {
                    warn!(error = %e, "failed to persist task breakdown");
                }
            }
            Some(result)
        } else {
            None
        };

        let (enhanced_prompt, context_used, curation_metrics) = self.response_builder.build(&BuildInput {
            prompt: &prompt,
            detection: &detection,
            curated_docs: &curated_docs,
            repo_facts: &repo_facts,
            snippets: &snippets,
            todos: &todos,
            breakdown: breakdown.as_ref(),
            max_tokens,
            curation_enabled: options.use_ai_enhancement,
        });

        let response = EnhancedResponse {
            enhanced_prompt,
            context_used,
            frameworks_detected: detection.frameworks.clone(),
            curation_metrics,
            breakdown,
            success: true,
        };

        let quality_score = if curated_docs.is_empty() {
            None
        } else {
            Some(curated_docs.iter().map(|d| d.quality_score).sum::<f64>() / curated_docs.len() as f64)
        };
        self.cache.store(key, response.clone(), detection.frameworks, quality_score).await;

        response
    }

    async fn list_active_todos(&self, project_id: &str) -> Vec<crate::model::Todo> {
        let active = [TodoStatus::Pending, TodoStatus::InProgress];
        self.todos.list_todos(project_id, Some(&active)).await.unwrap_or_else(|e| {
            warn!(error = %e, "todo lookup failed, continuing without current tasks");
            Vec::new()
        })
    }

    async fn fetch_docs(&self, frameworks: &[String]) -> Vec<Documentation> {
        if frameworks.is_empty() || !self.context7.is_enabled() {
            return Vec::new();
        }

        let fan_out = self.context7_fan_out.max(1);
        let result = tokio::time::timeout(self.context7_stage_deadline, async {
            let mut in_flight = FuturesUnordered::new();
            let mut iter = frameworks.iter();
            let mut docs = Vec::new();

            for fw in iter.by_ref().take(fan_out) {
                in_flight.push(self.resolve_and_fetch(fw));
            }
            while let Some(doc) = in_flight.next().await {
                if let Some(doc) = doc {
                    docs.push(doc);
                }
                if let Some(fw) = iter.next() {
                    in_flight.push(self.resolve_and_fetch(fw));
                }
            }
            docs
        })
        .await;

        result.unwrap_or_else(|_| {
            warn!("context7 retrieval exceeded its stage deadline");
            Vec::new()
        })
    }

    async fn resolve_and_fetch(&self, framework: &str) -> Option<Documentation> {
        let handles = self.context7.resolve_library_id(framework).await;
        let best = self.context7.select_best(Some(framework), &handles)?;
        Some(self.context7.get_library_docs(&best.library_id, None, 1000).await)
    }

    fn should_breakdown(&self, options: &EnhanceOptions, level: ComplexityLevel, prompt: &str) -> bool {
        match options.include_breakdown {
            Some(explicit) => explicit,
            None => {
                let lower = prompt.to_lowercase();
                level == ComplexityLevel::Complex || BREAKDOWN_TRIGGERS.iter().any(|t| lower.contains(t))
            }
        }
    }
}

fn empty_context_used() -> crate::model::ContextUsed {
    crate::model::ContextUsed {
        repo_facts: Vec::new(),
        code_snippets: Vec::new(),
        context7_docs: Vec::new(),
        todos: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakdownSettings, CacheSettings, Context7Config, CuratorSettings, ProjectAnalyzerSettings};

    async fn test_orchestrator() -> (EnhanceOrchestrator, tempfile::TempDir) {
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
        (orchestrator, dir)
    }

    #[tokio::test]
    async fn simple_prompt_is_enhanced_without_breakdown() {
        let (orchestrator, _dir) = test_orchestrator().await;
        let prompt = Prompt::new("how do I center a div").unwrap();
        let response = orchestrator.enhance(prompt.clone(), EnhanceContext::default(), EnhanceOptions::default()).await;
        assert!(response.success);
        assert!(response.enhanced_prompt.contains(prompt.as_str()));
        assert!(response.breakdown.is_none());
    }

    #[tokio::test]
    async fn complex_build_prompt_triggers_breakdown_attempt() {
        let (orchestrator, _dir) = test_orchestrator().await;
        let prompt = Prompt::new(
            "Build a full application with user authentication, a dashboard, file uploads, \
             and a notifications system using React, Node.js and PostgreSQL",
        )
        .unwrap();
        let response = orchestrator.enhance(prompt, EnhanceContext::default(), EnhanceOptions::default()).await;
        assert!(response.success);
        // No LLM configured in this test harness, so the breakdown itself
        // degrades to success = false, but the attempt must still run and
        // the enhanced prompt must still come back.
        assert!(response.breakdown.is_some());
        assert!(!response.breakdown.unwrap().success);
    }

    #[tokio::test]
    async fn cache_hit_is_deterministic_for_identical_inputs() {
        let (orchestrator, _dir) = test_orchestrator().await;
        let prompt = Prompt::new("explain ownership in rust").unwrap();
        let first = orchestrator.enhance(prompt.clone(), EnhanceContext::default(), EnhanceOptions::default()).await;
        let second = orchestrator.enhance(prompt, EnhanceContext::default(), EnhanceOptions::default()).await;
        assert_eq!(first.enhanced_prompt, second.enhanced_prompt);
    }

    #[tokio::test]
    async fn use_cache_false_bypasses_cache_lookup() {
        let (orchestrator, _dir) = test_orchestrator().await;
        let prompt = Prompt::new("explain traits in rust").unwrap();
        let options = EnhanceOptions { use_cache: false, ..EnhanceOptions::default() };
        let response = orchestrator.enhance(prompt, EnhanceContext::default(), options).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn soft_stale_entry_is_served_immediately_while_refresh_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache_settings = CacheSettings::default();
        cache_settings.ttl = std::time::Duration::from_secs(0);
        cache_settings.soft_refresh_window = std::time::Duration::from_secs(3600);
        let cache = PromptCache::open(&dir.path().join("cache.db"), cache_settings).await;
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

        let prompt = Prompt::new("explain lifetimes in rust").unwrap();
        let first = orchestrator.enhance(prompt.clone(), EnhanceContext::default(), EnhanceOptions::default()).await;
        assert!(first.success);

        // The entry is already past its zero-second TTL but within the
        // soft-refresh window, so the second call must not block on a
        // rebuild — it gets the stale value back immediately.
        let second = orchestrator.enhance(prompt, EnhanceContext::default(), EnhanceOptions::default()).await;
        assert_eq!(first.enhanced_prompt, second.enhanced_prompt);
    }
}
