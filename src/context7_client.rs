//! Context7 documentation service client.
//!
//! Talks to two JSON-RPC-shaped HTTP endpoints (`resolve-library-id`,
//! `get-library-docs`) on an external documentation server. The retry
//! loop splits into an outer `call_api`-style wrapper and an inner
//! single-attempt call; the in-process memo is a plain
//! `RwLock<HashMap<_, _>>` hot store rather than pulling in a generic
//! cache crate for a single small table.

use crate::config::Context7Config;
use crate::model::{Documentation, LibraryHandle, LibraryId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const RETRY_DELAYS_MS: &[u64] = &[200, 800];

struct MemoEntry {
    handles: Vec<LibraryHandle>,
    expires_at: Instant,
}

pub struct Context7Client {
    client: reqwest::Client,
    config: Context7Config,
    memo: Arc<RwLock<HashMap<String, MemoEntry>>>,
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    #[serde(rename = "libraryName")]
    library_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResolveResponseHandle {
    #[serde(rename = "libraryId")]
    library_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "trustScore")]
    trust_score: f64,
    #[serde(default, rename = "codeSnippets")]
    code_snippets: u64,
}

#[derive(Debug, Serialize)]
struct DocsRequest<'a> {
    #[serde(rename = "context7CompatibleLibraryID")]
    library_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    tokens: usize,
}

#[derive(Debug, Deserialize)]
struct DocsResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: DocsMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct DocsMetadata {
    #[serde(default)]
    source: String,
}

impl Context7Client {
    pub fn new(config: Context7Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            memo: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Resolve a human-readable library name to an ordered list of
    /// candidate handles. Empty on a documented miss; transport failures
    /// degrade to an empty list rather than propagate, since callers treat
    /// "no handles" as a normal outcome. Callers that need to distinguish
    /// a true transport error should inspect the returned `Err` from
    /// `try_resolve_library_id`.
    pub async fn resolve_library_id(&self, name: &str) -> Vec<LibraryHandle> {
        self.try_resolve_library_id(name).await.unwrap_or_default()
    }

    async fn try_resolve_library_id(&self, name: &str) -> anyhow::Result<Vec<LibraryHandle>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let key = name.to_lowercase();
        if let Some(cached) = self.memo_get(&key).await {
            return Ok(cached);
        }

        let handles = self.with_retry("resolve_library_id", || self.resolve_once(name)).await?;
        self.memo_put(key, handles.clone()).await;
        Ok(handles)
    }

    async fn resolve_once(&self, name: &str) -> anyhow::Result<Vec<LibraryHandle>> {
        let url = format!("{}/resolve-library-id", self.config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(&ResolveRequest { library_name: name });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("context7 resolve-library-id returned {status}");
        }

        let handles: Vec<ResolveResponseHandle> = response.json().await.unwrap_or_default();
        Ok(handles
            .into_iter()
            .map(|h| LibraryHandle {
                library_id: LibraryId(h.library_id),
                name: h.name,
                description: h.description,
                trust_score: h.trust_score.clamp(0.0, 10.0),
                code_snippets: h.code_snippets,
            })
            .collect())
    }

    /// Fetch documentation for a resolved library. A server-reported
    /// absence is a successful `Documentation` with empty content, not an
    /// error.
    pub async fn get_library_docs(
        &self,
        library_id: &LibraryId,
        topic: Option<&str>,
        token_budget: usize,
    ) -> Documentation {
        if !self.config.enabled {
            return Documentation::empty(library_id.clone(), "context7-disabled");
        }

        match self
            .with_retry("get_library_docs", || self.docs_once(library_id, topic, token_budget))
            .await
        {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, library_id = %library_id, "context7 doc fetch failed, degrading to empty");
                Documentation::empty(library_id.clone(), "context7-unavailable")
            }
        }
    }

    async fn docs_once(
        &self,
        library_id: &LibraryId,
        topic: Option<&str>,
        token_budget: usize,
    ) -> anyhow::Result<Documentation> {
        let url = format!("{}/get-library-docs", self.config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(&DocsRequest {
            library_id: library_id.0.as_str(),
            topic,
            tokens: token_budget,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("context7 get-library-docs returned {status}");
        }

        let parsed: DocsResponse = response.json().await?;
        Ok(Documentation {
            library_id: library_id.clone(),
            topic: topic.map(|t| t.to_string()),
            tokens: crate::model::estimate_tokens(&parsed.content),
            content: parsed.content,
            retrieved_at: chrono::Utc::now(),
            source: if parsed.metadata.source.is_empty() {
                "context7".to_string()
            } else {
                parsed.metadata.source
            },
        })
    }

    /// `selectBest`: prefer the canonical-mapping match if known, else the
    /// highest trust score, breaking ties by code snippet count.
    pub fn select_best<'a>(
        &self,
        canonical: Option<&str>,
        candidates: &'a [LibraryHandle],
    ) -> Option<&'a LibraryHandle> {
        if let Some(canonical) = canonical {
            if let Some(found) = candidates
                .iter()
                .find(|h| h.library_id.0.eq_ignore_ascii_case(canonical) || h.name.eq_ignore_ascii_case(canonical))
            {
                return Some(found);
            }
        }

        candidates.iter().max_by(|a, b| {
            a.trust_score
                .partial_cmp(&b.trust_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.code_snippets.cmp(&b.code_snippets))
        })
    }

    async fn with_retry<F, Fut, T>(&self, stage: &'static str, mut f: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let mut last_error = None;
        for (attempt, delay_ms) in std::iter::once(&0).chain(RETRY_DELAYS_MS.iter()).enumerate() {
            if attempt > 0 {
                debug!(stage, attempt, delay_ms, "retrying context7 call");
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            }
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("{stage} failed with no attempts")))
    }

    async fn memo_get(&self, key: &str) -> Option<Vec<LibraryHandle>> {
        let memo = self.memo.read().await;
        memo.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.handles.clone())
            } else {
                None
            }
        })
    }

    async fn memo_put(&self, key: String, handles: Vec<LibraryHandle>) {
        let mut memo = self.memo.write().await;
        memo.insert(
            key,
            MemoEntry {
                handles,
                expires_at: Instant::now() + self.config.memo_ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str, trust: f64, snippets: u64) -> LibraryHandle {
        LibraryHandle {
            library_id: LibraryId(id.to_string()),
            name: id.to_string(),
            description: String::new(),
            trust_score: trust,
            code_snippets: snippets,
        }
    }

    #[test]
    fn select_best_prefers_canonical_match() {
        let client = Context7Client::new(Context7Config::default());
        let candidates = vec![handle("/facebook/react", 9.0, 100), handle("/some/react-fork", 9.9, 500)];
        let best = client.select_best(Some("/facebook/react"), &candidates).unwrap();
        assert_eq!(best.library_id.0, "/facebook/react");
    }

    #[test]
    fn select_best_falls_back_to_trust_then_snippets() {
        let client = Context7Client::new(Context7Config::default());
        let candidates = vec![handle("/a/a", 5.0, 10), handle("/b/b", 5.0, 50), handle("/c/c", 3.0, 999)];
        let best = client.select_best(None, &candidates).unwrap();
        assert_eq!(best.library_id.0, "/b/b");
    }

    #[tokio::test]
    async fn disabled_client_resolves_to_empty() {
        let mut config = Context7Config::default();
        config.enabled = false;
        let client = Context7Client::new(config);
        let result = client.resolve_library_id("react").await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn disabled_client_docs_are_empty_and_succeed() {
        let mut config = Context7Config::default();
        config.enabled = false;
        let client = Context7Client::new(config);
        let doc = client
            .get_library_docs(&LibraryId("/facebook/react".to_string()), None, 1000)
            .await;
        assert!(doc.is_empty());
    }
}
