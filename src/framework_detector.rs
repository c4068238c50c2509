//! Pattern + AI-assisted framework/library identification.
//!
//! The keyword→framework dictionary and the weighted-then-normalized
//! scoring pass are a set of keyword-bucket helpers generalized from a
//! yes/no intent vote into an accumulated weight per framework
//! identifier.

use crate::llm_client::LlmClient;
use crate::model::{DetectionMethod, EnhanceContext, FrameworkDetectionResult, RepoFacts};
use std::collections::HashMap;
use tracing::debug;

/// lowercase keyword -> canonical framework identifier.
const PATTERN_DICTIONARY: &[(&str, &str)] = &[
    ("react", "react"),
    ("jsx", "react"),
    ("vue", "vue"),
    ("vuex", "vue"),
    ("angular", "angular"),
    ("ngmodule", "angular"),
    ("next.js", "next.js"),
    ("nextjs", "next.js"),
    ("svelte", "svelte"),
    ("typescript", "typescript"),
    (".ts", "typescript"),
    ("express", "express"),
    ("fastify", "fastify"),
    ("django", "django"),
    ("flask", "flask"),
    ("fastapi", "fastapi"),
    ("mongodb", "mongodb"),
    ("mongoose", "mongodb"),
    ("postgresql", "postgresql"),
    ("postgres", "postgresql"),
    ("mysql", "mysql"),
    ("redis", "redis"),
    ("tailwind", "tailwind"),
    ("graphql", "graphql"),
    ("docker", "docker"),
    ("kubernetes", "kubernetes"),
    ("html", "html"),
    ("css", "css"),
];

/// Detect frameworks for one `enhance` call. Never blocks on project facts —
/// an empty `RepoFacts` is a valid input.
pub async fn detect(
    prompt: &str,
    context: Option<&EnhanceContext>,
    project_facts: &RepoFacts,
    llm: Option<&LlmClient>,
) -> FrameworkDetectionResult {
    let lower = prompt.to_lowercase();
    let mut weights: HashMap<String, f64> = HashMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut order = 0usize;
    let mut pattern_matched = false;

    let mut add = |name: &str, weight: f64, order_counter: &mut usize| {
        let key = name.to_lowercase();
        *weights.entry(key.clone()).or_insert(0.0) += weight;
        first_seen.entry(key).or_insert_with(|| {
            let v = *order_counter;
            *order_counter += 1;
            v
        });
    };

    for (keyword, framework) in PATTERN_DICTIONARY {
        if lower.contains(keyword) {
            add(framework, 1.0, &mut order);
            pattern_matched = true;
        }
    }

    if let Some(ctx) = context {
        if let Some(framework) = ctx.framework.as_ref() {
            if !framework.trim().is_empty() {
                add(framework, 1.0, &mut order);
            }
        }
    }

    for fact in project_facts {
        let fact_lower = fact.to_lowercase();
        for (_, framework) in PATTERN_DICTIONARY {
            if fact_lower.contains(framework) {
                add(framework, 0.5, &mut order);
            }
        }
    }

    let mut confidence = confidence_from_weights(&weights);
    let mut method = if pattern_matched {
        DetectionMethod::Pattern
    } else if weights.is_empty() {
        DetectionMethod::Fallback
    } else {
        DetectionMethod::Project
    };

    if (weights.is_empty() || confidence < 0.5) && llm.is_some_and(|c| c.is_enabled()) {
        if let Some(suggestions) = ai_suggest(prompt, llm.unwrap()).await {
            if !suggestions.is_empty() {
                method = if method == DetectionMethod::Pattern {
                    DetectionMethod::Hybrid
                } else {
                    DetectionMethod::Ai
                };
                for name in &suggestions {
                    add(name, 0.5, &mut order);
                }
                confidence = confidence_from_weights(&weights);
            }
        }
    }

    let mut frameworks: Vec<String> = weights.keys().cloned().collect();
    frameworks.sort_by(|a, b| {
        let wa = weights[a];
        let wb = weights[b];
        wb.partial_cmp(&wa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| first_seen[a].cmp(&first_seen[b]))
    });
    frameworks.dedup();

    if confidence <= 0.2 {
        frameworks.clear();
        method = DetectionMethod::Fallback;
    }

    FrameworkDetectionResult {
        frameworks,
        confidence,
        method: Some(method),
        suggestions: Vec::new(),
    }
}

fn confidence_from_weights(weights: &HashMap<String, f64>) -> f64 {
    let sum: f64 = weights.values().sum();
    (sum / 2.0).min(1.0)
}

async fn ai_suggest(prompt: &str, llm: &LlmClient) -> Option<Vec<String>> {
    let system = "Name the web/software frameworks or libraries this prompt is about. \
        Reply with ONLY a comma-separated list of lowercase identifiers, or an empty string if none.";

    let completion = match llm.complete("framework_detection", system, prompt).await {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "framework ai pass unavailable");
            return None;
        }
    };

    let names: Vec<String> = completion
        .content
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    Some(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detects_react_from_keyword() {
        let result = detect("Create a React component", None, &Vec::new(), None).await;
        assert!(result.frameworks.contains(&"react".to_string()));
        assert_eq!(result.method, Some(DetectionMethod::Pattern));
    }

    #[tokio::test]
    async fn context_framework_is_added() {
        let ctx = EnhanceContext {
            framework: Some("Vue".to_string()),
            ..Default::default()
        };
        let result = detect("build something", Some(&ctx), &Vec::new(), None).await;
        assert!(result.frameworks.contains(&"vue".to_string()));
    }

    #[tokio::test]
    async fn unknown_framework_yields_empty_fallback() {
        let result = detect("make me a sandwich", None, &Vec::new(), None).await;
        assert!(result.frameworks.is_empty());
        assert_eq!(result.method, Some(DetectionMethod::Fallback));
        assert!(result.confidence <= 0.5);
    }

    #[tokio::test]
    async fn identical_inputs_are_deterministic() {
        let a = detect("Create a React component with TypeScript", None, &Vec::new(), None).await;
        let b = detect("Create a React component with TypeScript", None, &Vec::new(), None).await;
        assert_eq!(a.frameworks, b.frameworks);
        assert_eq!(a.confidence, b.confidence);
    }

    #[tokio::test]
    async fn frameworks_are_lowercase_and_deduped() {
        let result = detect("React react REACT component", None, &Vec::new(), None).await;
        assert_eq!(result.frameworks, vec!["react".to_string()]);
    }
}
