//! Local workspace scanning: repository facts + relevance-ranked code
//! snippets.
//!
//! The bounded-depth recursive walk is plain `std::fs::read_dir`
//! recursion run inside `tokio::task::spawn_blocking`, not the
//! `walkdir`/`ignore` crates. The relevance scoring is a keyword-weighted
//! bag-of-words overlap, deliberately without any embedding model.

use crate::config::ProjectAnalyzerSettings;
use crate::model::{CodeSnippet, RepoFacts};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

const EXCLUDED_DIRS: &[&str] = &[
    "node_modules", ".git", "target", "dist", "build", ".next", "vendor",
    "__pycache__", ".venv", "venv", ".cache", ".promptmcp",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "rb", "c", "cpp", "h", "hpp",
];

pub struct ProjectAnalyzer {
    root: PathBuf,
    settings: ProjectAnalyzerSettings,
}

#[derive(Default, Clone)]
struct ScanResult {
    facts: RepoFacts,
    candidates: Vec<(PathBuf, String)>,
}

impl ProjectAnalyzer {
    pub fn new(root: impl Into<PathBuf>, settings: ProjectAnalyzerSettings) -> Self {
        Self {
            root: root.into(),
            settings,
        }
    }

    /// Scan the workspace for repo facts and the top-K most relevant code
    /// snippets for `prompt`. Read-only, bounded by a soft deadline; on
    /// timeout returns whatever facts and candidate files the walk had
    /// already collected, since the blocking task writes into `progress`
    /// as it goes rather than only at the end.
    pub async fn analyze(&self, prompt: &str) -> (RepoFacts, Vec<CodeSnippet>) {
        let root = self.root.clone();
        let settings = self.settings.clone();
        let progress = Arc::new(Mutex::new(ScanResult::default()));
        let progress_for_task = Arc::clone(&progress);

        let scan = tokio::time::timeout(
            settings.deadline,
            tokio::task::spawn_blocking(move || scan_sync(&root, &settings, &progress_for_task)),
        )
        .await;

        match scan {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "project scan failed"),
            Ok(Err(e)) => warn!(error = %e, "project scan task panicked"),
            Err(_) => warn!("project scan exceeded its soft deadline, using partial results"),
        }

        let result = match Arc::try_unwrap(progress) {
            Ok(lock) => lock.into_inner().unwrap_or_default(),
            Err(shared) => shared.lock().unwrap_or_else(|p| p.into_inner()).clone(),
        };

        let snippets = rank_snippets(prompt, result.candidates, &self.settings);
        (result.facts, snippets)
    }
}

fn scan_sync(root: &Path, settings: &ProjectAnalyzerSettings, progress: &Mutex<ScanResult>) -> anyhow::Result<()> {
    walk(root, root, 0, settings, progress);

    let mut result = progress.lock().unwrap_or_else(|p| p.into_inner());
    extract_manifest_facts(root, &mut result.facts);
    result.facts.truncate(settings.max_facts);
    Ok(())
}

fn walk(root: &Path, dir: &Path, depth: usize, settings: &ProjectAnalyzerSettings, progress: &Mutex<ScanResult>) {
    if depth > settings.max_depth {
        return;
    }
    if progress.lock().unwrap_or_else(|p| p.into_inner()).candidates.len() >= settings.max_files {
        return;
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if progress.lock().unwrap_or_else(|p| p.into_inner()).candidates.len() >= settings.max_files {
            return;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if name.starts_with('.') && name != ".env.example" {
            continue;
        }
        if EXCLUDED_DIRS.contains(&name.as_str()) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            walk(root, &path, depth + 1, settings, progress);
        } else if file_type.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if SOURCE_EXTENSIONS.contains(&ext) {
                    if let Ok(metadata) = entry.metadata() {
                        if (metadata.len() as usize) <= settings.max_file_bytes {
                            if let Ok(content) = std::fs::read_to_string(&path) {
                                progress
                                    .lock()
                                    .unwrap_or_else(|p| p.into_inner())
                                    .candidates
                                    .push((path, content));
                            }
                        }
                    }
                }
            }
        }
    }
}

fn extract_manifest_facts(root: &Path, facts: &mut RepoFacts) {
    if let Ok(content) = std::fs::read_to_string(root.join("package.json")) {
        if let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&content) {
            if let Some(deps) = manifest.get("dependencies").and_then(|d| d.as_object()) {
                for (name, version) in deps {
                    if is_known_framework(name) {
                        facts.push(truncate_fact(format!(
                            "Project uses {name} ({})",
                            version.as_str().unwrap_or("unknown")
                        )));
                    }
                }
            }
            if manifest.get("devDependencies").is_some() {
                facts.push(truncate_fact("Project has a devDependencies section".to_string()));
            }
        }
    }

    if root.join("Cargo.toml").is_file() {
        facts.push(truncate_fact("Project is a Rust crate (Cargo.toml present)".to_string()));
    }
    if root.join("tsconfig.json").is_file() {
        facts.push(truncate_fact("Project uses TypeScript (tsconfig.json present)".to_string()));
    }
    if root.join("Dockerfile").is_file() {
        facts.push(truncate_fact("Project has a Dockerfile".to_string()));
    }
    if root.join("jest.config.js").is_file() || root.join("vitest.config.ts").is_file() {
        facts.push(truncate_fact("Testing setup present".to_string()));
    }

    facts.dedup();
}

fn is_known_framework(name: &str) -> bool {
    const KNOWN: &[&str] = &[
        "react", "vue", "@angular/core", "next", "svelte", "express", "fastify",
        "mongoose", "pg", "mysql2", "redis", "tailwindcss", "graphql",
    ];
    KNOWN.iter().any(|k| name.contains(k))
}

fn truncate_fact(fact: String) -> String {
    if fact.chars().count() <= 256 {
        fact
    } else {
        fact.chars().take(256).collect()
    }
}

fn rank_snippets(
    prompt: &str,
    candidates: Vec<(PathBuf, String)>,
    settings: &ProjectAnalyzerSettings,
) -> Vec<CodeSnippet> {
    let prompt_tokens = tokenize(prompt);
    if prompt_tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f64, PathBuf, String)> = candidates
        .into_iter()
        .map(|(path, content)| {
            let relevance = overlap_score(&prompt_tokens, &content);
            (relevance, path, content)
        })
        .filter(|(score, _, _)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(settings.top_k_snippets);

    scored
        .into_iter()
        .map(|(relevance, path, content)| CodeSnippet {
            file_path: path.to_string_lossy().to_string(),
            content: truncate_chars(&content, settings.snippet_char_bound),
            relevance,
        })
        .collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 2)
        .map(|s| s.to_string())
        .collect()
}

/// Cosine-like overlap between the prompt's token set and a windowed
/// substring's token set, without any embedding model.
fn overlap_score(prompt_tokens: &HashSet<String>, content: &str) -> f64 {
    let content_tokens = tokenize(content);
    if content_tokens.is_empty() {
        return 0.0;
    }
    let intersection = prompt_tokens.intersection(&content_tokens).count() as f64;
    let denom = ((prompt_tokens.len() as f64).sqrt()) * ((content_tokens.len() as f64).sqrt());
    if denom == 0.0 {
        0.0
    } else {
        (intersection / denom).min(1.0)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn empty_workspace_yields_no_facts_or_snippets() {
        let dir = tempdir().unwrap();
        let analyzer = ProjectAnalyzer::new(dir.path(), ProjectAnalyzerSettings::default());
        let (facts, snippets) = analyzer.analyze("anything").await;
        assert!(facts.is_empty());
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn detects_rust_crate_fact() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname=\"x\"").unwrap();
        let analyzer = ProjectAnalyzer::new(dir.path(), ProjectAnalyzerSettings::default());
        let (facts, _) = analyzer.analyze("anything").await;
        assert!(facts.iter().any(|f| f.contains("Rust crate")));
    }

    #[tokio::test]
    async fn ranks_relevant_source_file_above_unrelated() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("auth.rs"), "fn login(username: &str, password: &str) {}").unwrap();
        std::fs::write(dir.path().join("unrelated.rs"), "fn noop() {}").unwrap();
        let analyzer = ProjectAnalyzer::new(dir.path(), ProjectAnalyzerSettings::default());
        let (_, snippets) = analyzer.analyze("how does login authentication work").await;
        assert!(!snippets.is_empty());
        assert!(snippets[0].file_path.contains("auth.rs"));
    }

    #[test]
    fn never_mutates_workspace() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let before: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        let _ = tokio::runtime::Runtime::new().unwrap().block_on(async {
            let analyzer = ProjectAnalyzer::new(dir.path(), ProjectAnalyzerSettings::default());
            analyzer.analyze("anything").await
        });
        let after: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(before.len(), after.len());
    }
}
