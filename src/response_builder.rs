//! Final enhanced-prompt assembly under a token budget.
//!
//! A plain `String` grown with `push_str`, one labelled section at a
//! time. Sections are appended in priority order and the lowest-priority
//! content is the first to be dropped once the token ceiling is hit. The
//! original prompt is never touched by the budget.

use crate::model::{
    estimate_tokens, CodeSnippet, ContextUsed, CuratedContent, CurationMetrics, FrameworkDetectionResult,
    Prompt, TaskBreakdownResult, Todo,
};

#[derive(Clone, Copy)]
pub struct ResponseBuilder;

pub struct BuildInput<'a> {
    pub prompt: &'a Prompt,
    pub detection: &'a FrameworkDetectionResult,
    pub curated_docs: &'a [CuratedContent],
    pub repo_facts: &'a [String],
    pub snippets: &'a [CodeSnippet],
    pub todos: &'a [Todo],
    pub breakdown: Option<&'a TaskBreakdownResult>,
    pub max_tokens: usize,
    pub curation_enabled: bool,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Assemble the enhanced prompt. Returns the final text plus a record of
    /// what was actually included (for `ContextUsed`) and, when curation ran,
    /// aggregate curation metrics.
    pub fn build(&self, input: &BuildInput<'_>) -> (String, ContextUsed, Option<CurationMetrics>) {
        let mut output = input.prompt.as_str().to_string();
        let mut used = estimate_tokens(&output);
        let budget = input.max_tokens;

        let mut context_used = ContextUsed {
            repo_facts: Vec::new(),
            code_snippets: Vec::new(),
            context7_docs: Vec::new(),
            todos: Vec::new(),
        };

        // (1) Detected frameworks.
        if !input.detection.frameworks.is_empty() {
            let section = frameworks_section(input.detection);
            append_if_fits(&mut output, &mut used, budget, &section);
        }

        // (2) Framework docs, curated-first, truncated at section boundaries.
        let mut sorted_docs: Vec<&CuratedContent> = input.curated_docs.iter().collect();
        sorted_docs.sort_by(|a, b| a.original.library_id.0.cmp(&b.original.library_id.0));
        if !sorted_docs.is_empty() {
            output.push_str("\n\n## Framework Best Practices (from Context7):\n");
            used += estimate_tokens("\n\n## Framework Best Practices (from Context7):\n");
            for doc in &sorted_docs {
                let remaining_chars = budget.saturating_sub(used) * 4;
                if remaining_chars == 0 {
                    break;
                }
                let block = doc_section(doc, remaining_chars);
                let tokens = estimate_tokens(&block);
                if used + tokens > budget {
                    continue;
                }
                output.push_str(&block);
                used += tokens;
                context_used.context7_docs.push(doc.original.library_id.0.clone());
            }
        }

        // (3) Project facts.
        if !input.repo_facts.is_empty() {
            let mut facts = input.repo_facts.to_vec();
            loop {
                if facts.is_empty() {
                    break;
                }
                let section = facts_section(&facts);
                let tokens = estimate_tokens(&section);
                if used + tokens <= budget {
                    output.push_str(&section);
                    used += tokens;
                    context_used.repo_facts = facts;
                    break;
                }
                facts.pop();
            }
        }

        // (4) Code snippets, lowest relevance dropped first.
        let mut sorted_snippets: Vec<&CodeSnippet> = input.snippets.iter().collect();
        sorted_snippets.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        if !sorted_snippets.is_empty() {
            let mut header_written = false;
            for snippet in sorted_snippets {
                let block = snippet_block(snippet, header_written);
                let tokens = estimate_tokens(&block);
                if used + tokens > budget {
                    continue;
                }
                output.push_str(&block);
                used += tokens;
                header_written = true;
                context_used.code_snippets.push(snippet.clone());
            }
        }

        // (5) Current project tasks.
        if !input.todos.is_empty() {
            let mut titles: Vec<&str> = input.todos.iter().map(|t| t.title.as_str()).collect();
            loop {
                if titles.is_empty() {
                    break;
                }
                let section = tasks_section(&titles);
                let tokens = estimate_tokens(&section);
                if used + tokens <= budget {
                    output.push_str(&section);
                    used += tokens;
                    context_used.todos = titles.into_iter().map(|s| s.to_string()).collect();
                    break;
                }
                titles.pop();
            }
        }

        // (6) Task breakdown.
        if let Some(breakdown) = input.breakdown {
            let section = breakdown_section(breakdown);
            let tokens = estimate_tokens(&section);
            if used + tokens <= budget {
                output.push_str(&section);
            }
        }

        let curation_metrics = if input.curation_enabled && !input.curated_docs.is_empty() {
            Some(aggregate_curation_metrics(input.curated_docs, input.curation_enabled))
        } else if input.curation_enabled {
            Some(CurationMetrics {
                total_token_reduction: 0.0,
                average_quality_score: 0.0,
                curation_enabled: true,
            })
        } else {
            None
        };

        (output, context_used, curation_metrics)
    }
}

fn append_if_fits(output: &mut String, used: &mut usize, budget: usize, section: &str) {
    let tokens = estimate_tokens(section);
    if *used + tokens <= budget {
        output.push_str(section);
        *used += tokens;
    }
}

fn frameworks_section(detection: &FrameworkDetectionResult) -> String {
    format!(
        "\n\n## Detected Frameworks/Libraries:\n- Frameworks: {}\n- Detection Method: {}\n- Confidence: {:.0}%\n",
        detection.frameworks.join(", "),
        detection.method.map(|m| format!("{m:?}")).unwrap_or_else(|| "unknown".to_string()),
        detection.confidence * 100.0,
    )
}

fn doc_section(doc: &CuratedContent, char_budget: usize) -> String {
    let mut content = doc.content.clone();
    if content.chars().count() > char_budget {
        content = truncate_at_section_boundary(&content, char_budget);
    }
    format!("\n### {} Documentation:\n{}\n", doc.original.library_id, content)
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

fn facts_section(facts: &[String]) -> String {
    let mut section = String::from("\n\n## Project Context:\n- Repo facts:\n");
    for fact in facts {
        section.push_str("  - ");
        section.push_str(fact);
        section.push('\n');
    }
    section
}

fn snippet_block(snippet: &CodeSnippet, header_written: bool) -> String {
    let mut block = String::new();
    if !header_written {
        block.push_str("\n- Code snippets:\n");
    }
    block.push_str(&format!("  ```\n  // {}\n{}\n  ```\n", snippet.file_path, snippet.content));
    block
}

fn tasks_section(titles: &[&str]) -> String {
    let mut section = String::from("\n\n## Current Project Tasks:\n");
    for title in titles {
        section.push_str("- ");
        section.push_str(title);
        section.push('\n');
    }
    section
}

fn breakdown_section(breakdown: &TaskBreakdownResult) -> String {
    let mut section = String::from("\n\n## Task Breakdown:\n");
    for task in &breakdown.main_tasks {
        section.push_str(&format!("- {} ({}, {:.1}h)\n", task.title, task.priority.as_str(), task.estimated_hours));
    }
    for subtask in &breakdown.subtasks {
        section.push_str(&format!("  - {}: {}\n", subtask.parent_task_id, subtask.title));
    }
    for dep in &breakdown.dependencies {
        section.push_str(&format!("  - {} depends on {}\n", dep.task_id, dep.depends_on_task_id));
    }
    section
}

fn aggregate_curation_metrics(docs: &[CuratedContent], curation_enabled: bool) -> CurationMetrics {
    let count = docs.len() as f64;
    let total_token_reduction = docs.iter().map(|d| d.token_reduction).sum::<f64>() / count.max(1.0);
    let average_quality_score = docs.iter().map(|d| d.quality_score).sum::<f64>() / count.max(1.0);
    CurationMetrics {
        total_token_reduction,
        average_quality_score,
        curation_enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CurationMeta, Documentation, LibraryId, TodoPriority, TodoStatus};

    fn sample_prompt() -> Prompt {
        Prompt::new("how do I use hooks in react").unwrap()
    }

    fn sample_detection() -> FrameworkDetectionResult {
        FrameworkDetectionResult {
            frameworks: vec!["react".to_string()],
            confidence: 0.8,
            method: Some(crate::model::DetectionMethod::Pattern),
            suggestions: Vec::new(),
        }
    }

    #[test]
    fn original_prompt_always_present_verbatim() {
        let builder = ResponseBuilder::new();
        let prompt = sample_prompt();
        let detection = FrameworkDetectionResult::empty(crate::model::DetectionMethod::Fallback);
        let (output, _, _) = builder.build(&BuildInput {
            prompt: &prompt,
            detection: &detection,
            curated_docs: &[],
            repo_facts: &[],
            snippets: &[],
            todos: &[],
            breakdown: None,
            max_tokens: 1,
            curation_enabled: false,
        });
        assert!(output.contains(prompt.as_str()));
    }

    #[test]
    fn frameworks_section_included_when_detected() {
        let builder = ResponseBuilder::new();
        let prompt = sample_prompt();
        let detection = sample_detection();
        let (output, _, _) = builder.build(&BuildInput {
            prompt: &prompt,
            detection: &detection,
            curated_docs: &[],
            repo_facts: &[],
            snippets: &[],
            todos: &[],
            breakdown: None,
            max_tokens: 4000,
            curation_enabled: false,
        });
        assert!(output.contains("Detected Frameworks"));
        assert!(output.contains("react"));
    }

    #[test]
    fn identical_inputs_produce_byte_identical_output() {
        let builder = ResponseBuilder::new();
        let prompt = sample_prompt();
        let detection = sample_detection();
        let input = BuildInput {
            prompt: &prompt,
            detection: &detection,
            curated_docs: &[],
            repo_facts: &["uses typescript".to_string()],
            snippets: &[],
            todos: &[],
            breakdown: None,
            max_tokens: 4000,
            curation_enabled: false,
        };
        let (a, _, _) = builder.build(&input);
        let (b, _, _) = builder.build(&input);
        assert_eq!(a, b);
    }

    #[test]
    fn low_relevance_snippet_dropped_before_high_relevance_under_tight_budget() {
        let builder = ResponseBuilder::new();
        let prompt = sample_prompt();
        let detection = FrameworkDetectionResult::empty(crate::model::DetectionMethod::Fallback);
        let snippets = vec![
            CodeSnippet { file_path: "low.rs".to_string(), content: "fn low() {}".to_string(), relevance: 0.1 },
            CodeSnippet { file_path: "high.rs".to_string(), content: "fn high() {}".to_string(), relevance: 0.9 },
        ];
        let (output, used, _) = builder.build(&BuildInput {
            prompt: &prompt,
            detection: &detection,
            curated_docs: &[],
            repo_facts: &[],
            snippets: &snippets,
            todos: &[],
            breakdown: None,
            max_tokens: estimate_tokens(prompt.as_str()) + 15,
            curation_enabled: false,
        });
        assert!(output.contains("high.rs"));
        assert!(used.code_snippets.iter().any(|s| s.file_path == "high.rs"));
    }

    #[test]
    fn curation_metrics_absent_when_curation_disabled() {
        let builder = ResponseBuilder::new();
        let prompt = sample_prompt();
        let detection = FrameworkDetectionResult::empty(crate::model::DetectionMethod::Fallback);
        let (_, _, metrics) = builder.build(&BuildInput {
            prompt: &prompt,
            detection: &detection,
            curated_docs: &[],
            repo_facts: &[],
            snippets: &[],
            todos: &[],
            breakdown: None,
            max_tokens: 4000,
            curation_enabled: false,
        });
        assert!(metrics.is_none());
    }

    #[test]
    fn doc_section_truncates_at_section_boundary_when_over_budget() {
        let doc = CuratedContent {
            original: Documentation {
                library_id: LibraryId("/facebook/react".to_string()),
                topic: None,
                content: String::new(),
                tokens: 0,
                retrieved_at: chrono::Utc::now(),
                source: "context7".to_string(),
            },
            content: "intro\n# Section Two\nmore content that keeps going for a while".to_string(),
            quality_score: 8.0,
            token_reduction: 0.5,
            key_patterns: Vec::new(),
            best_practices: Vec::new(),
            code_examples: Vec::new(),
            meta: CurationMeta { input_tokens: 20, output_tokens: 10, processing_millis: 0, confidence: 0.7 },
        };
        let section = doc_section(&doc, 20);
        assert!(!section.contains("Section Two"));
    }

    #[test]
    fn todo_for_breakdown_section_uses_priorities() {
        let task = Todo {
            id: "1".to_string(),
            project_id: "p".to_string(),
            title: "design api".to_string(),
            description: None,
            status: TodoStatus::Pending,
            priority: TodoPriority::High,
            category: "design".to_string(),
            estimated_hours: 2.0,
            created_at: chrono::Utc::now(),
            completed_at: None,
        };
        let breakdown = TaskBreakdownResult {
            main_tasks: vec![task],
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            estimated_total_hours: 2.0,
            success: true,
        };
        let section = breakdown_section(&breakdown);
        assert!(section.contains("design api"));
        assert!(section.contains("high"));
    }
}
