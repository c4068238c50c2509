//! Composite-key cache with hot in-memory + durable SQLite tiers.
//!
//! The durable tier keys on a content-hash unique index with an
//! `expires_at > datetime('now')` lookup and a hit-count increment on
//! read. The hot tier is an `RwLock`-guarded map with LRU-by-count and
//! byte-cap eviction. Single-flight uses a check-then-insert idiom on a
//! shared `tokio::sync::Mutex`-guarded future slot so concurrent misses
//! for the same key converge on one build.

use crate::config::CacheSettings;
use crate::model::{canonical_json, CacheEntry, EnhancedResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub average_response_millis: f64,
    pub size_bytes: u64,
    pub top_frameworks: Vec<String>,
}

struct HotEntry {
    entry: CacheEntry,
    bytes: usize,
}

struct HotTier {
    entries: HashMap<String, HotEntry>,
    order: VecDeque<String>,
    total_bytes: usize,
    capacity_entries: usize,
    capacity_bytes: usize,
}

impl HotTier {
    fn new(capacity_entries: usize, capacity_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            total_bytes: 0,
            capacity_entries,
            capacity_bytes,
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        let bytes = entry.value.enhanced_prompt.len();
        self.total_bytes += bytes;
        if let Some(old) = self.entries.insert(key.clone(), HotEntry { entry, bytes }) {
            self.total_bytes -= old.bytes;
        }
        self.touch(&key);
        self.evict_if_needed();
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity_entries || self.total_bytes > self.capacity_bytes {
            let Some(lru_key) = self.order.pop_front() else {
                break;
            };
            if let Some(removed) = self.entries.remove(&lru_key) {
                self.total_bytes -= removed.bytes;
            }
        }
    }
}

struct InFlight {
    notify: Arc<Notify>,
    result: Mutex<Option<EnhancedResponse>>,
}

pub struct PromptCache {
    hot: RwLock<HotTier>,
    pool: Option<sqlx::SqlitePool>,
    settings: CacheSettings,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

/// The fingerprint inputs used for the composite cache key: only things
/// known *before* framework detection runs. The key deliberately excludes
/// the detector's own output, so two prompts that resolve to the same
/// frameworks by different paths still share a cache entry.
pub struct CacheKeyInput<'a> {
    pub prompt: &'a str,
    pub context: &'a serde_json::Value,
    pub options: &'a serde_json::Value,
}

impl PromptCache {
    pub async fn open(db_path: &Path, settings: CacheSettings) -> Self {
        let pool = match Self::open_pool(db_path).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "durable cache tier unavailable, degrading to hot-tier-only");
                None
            }
        };

        Self {
            hot: RwLock::new(HotTier::new(settings.hot_capacity_entries, settings.hot_capacity_bytes)),
            pool,
            settings,
            in_flight: Mutex::new(HashMap::new()),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    async fn open_pool(db_path: &Path) -> anyhow::Result<sqlx::SqlitePool> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompt_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cache_key TEXT NOT NULL UNIQUE,
                frameworks TEXT NOT NULL,
                quality_score REAL,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                hits INTEGER NOT NULL DEFAULT 0,
                expires_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_prompt_cache_expires ON prompt_cache(expires_at)")
            .execute(&pool)
            .await?;
        Ok(pool)
    }

    /// Build the composite key fingerprint from inputs only (prompt,
    /// normalized context, options, schema version) — deliberately excludes
    /// `frameworks`, which is a downstream output, per the Open Question
    /// resolution in Design Notes §9.
    pub fn fingerprint(input: &CacheKeyInput<'_>) -> String {
        let normalized_prompt = input.prompt.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized_prompt.as_bytes());
        hasher.update(canonical_json(input.context).as_bytes());
        hasher.update(canonical_json(input.options).as_bytes());
        hasher.update(SCHEMA_VERSION.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// `true` in the returned tuple means the entry has passed its TTL but
    /// is still within the soft-refresh window: serve it, but the caller
    /// should kick off a rebuild rather than trust it indefinitely.
    fn staleness(&self, expires_at: chrono::DateTime<Utc>) -> Option<bool> {
        let now = Utc::now();
        if expires_at > now {
            return Some(false);
        }
        let soft_deadline = expires_at + chrono::Duration::from_std(self.settings.soft_refresh_window).unwrap_or_default();
        if now <= soft_deadline {
            Some(true)
        } else {
            None
        }
    }

    pub async fn lookup(&self, key: &str) -> Option<(CacheEntry, bool)> {
        {
            let mut hot = self.hot.write().await;
            if let Some(hot_entry) = hot.entries.get_mut(key) {
                if let Some(stale) = self.staleness(hot_entry.entry.expires_at) {
                    if hot_entry.entry.quality_score.unwrap_or(10.0) >= self.settings.quality_floor {
                        hot_entry.entry.last_accessed = Utc::now();
                        hot_entry.entry.hits += 1;
                        let result = hot_entry.entry.clone();
                        hot.touch(key);
                        self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        return Some((result, stale));
                    }
                }
            }
        }

        if let Some((entry, stale)) = self.lookup_durable(key).await {
            if entry.quality_score.unwrap_or(10.0) >= self.settings.quality_floor {
                self.hot.write().await.insert(key.to_string(), entry.clone());
                self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Some((entry, stale));
            }
        }

        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        None
    }

    async fn lookup_durable(&self, key: &str) -> Option<(CacheEntry, bool)> {
        let pool = self.pool.as_ref()?;
        let row = sqlx::query(
            "SELECT value, frameworks, quality_score, created_at, expires_at, hits \
             FROM prompt_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
        .ok()??;

        let expires_at_text: String = row.try_get("expires_at").ok()?;
        let expires_at = chrono::DateTime::parse_from_rfc3339(&expires_at_text).ok()?.with_timezone(&Utc);
        let stale = self.staleness(expires_at)?;

        let value_json: String = row.try_get("value").ok()?;
        let value: EnhancedResponse = serde_json::from_str(&value_json).ok()?;
        let frameworks_json: String = row.try_get("frameworks").ok()?;
        let frameworks: Vec<String> = serde_json::from_str(&frameworks_json).unwrap_or_default();

        let _ = sqlx::query(
            "UPDATE prompt_cache SET hits = hits + 1, last_accessed = datetime('now') WHERE cache_key = ?",
        )
        .bind(key)
        .execute(pool)
        .await;

        Some((
            CacheEntry {
                key: key.to_string(),
                value,
                frameworks,
                quality_score: row.try_get("quality_score").ok(),
                created_at: Utc::now(),
                last_accessed: Utc::now(),
                hits: row.try_get::<i64, _>("hits").unwrap_or(0) as u64,
                expires_at,
            },
            stale,
        ))
    }

    pub async fn store(&self, key: &str, value: EnhancedResponse, frameworks: Vec<String>, quality_score: Option<f64>) {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(self.settings.ttl).unwrap_or_default();
        let entry = CacheEntry {
            key: key.to_string(),
            value: value.clone(),
            frameworks: frameworks.clone(),
            quality_score,
            created_at: now,
            last_accessed: now,
            hits: 0,
            expires_at,
        };

        self.hot.write().await.insert(key.to_string(), entry);

        if let Some(pool) = &self.pool {
            let value_json = serde_json::to_string(&value).unwrap_or_default();
            let frameworks_json = serde_json::to_string(&frameworks).unwrap_or_default();
            let result = sqlx::query(
                "INSERT OR REPLACE INTO prompt_cache \
                 (cache_key, frameworks, quality_score, value, created_at, last_accessed, hits, expires_at) \
                 VALUES (?, ?, ?, ?, datetime('now'), datetime('now'), 0, ?)",
            )
            .bind(key)
            .bind(&frameworks_json)
            .bind(quality_score)
            .bind(&value_json)
            .bind(expires_at.to_rfc3339())
            .execute(pool)
            .await;

            if let Err(e) = result {
                warn!(error = %e, "durable cache write failed, entry remains hot-tier-only");
            }
        }
    }

    pub async fn invalidate(&self, pattern: Option<&str>) {
        let mut hot = self.hot.write().await;
        match pattern {
            Some(p) => {
                let keys: Vec<String> = hot.entries.keys().filter(|k| k.contains(p)).cloned().collect();
                for k in keys {
                    if let Some(removed) = hot.entries.remove(&k) {
                        hot.total_bytes -= removed.bytes;
                    }
                    hot.order.retain(|existing| existing != &k);
                }
            }
            None => {
                hot.entries.clear();
                hot.order.clear();
                hot.total_bytes = 0;
            }
        }
        drop(hot);

        if let Some(pool) = &self.pool {
            let result = match pattern {
                Some(p) => {
                    sqlx::query("DELETE FROM prompt_cache WHERE cache_key LIKE ?")
                        .bind(format!("%{p}%"))
                        .execute(pool)
                        .await
                }
                None => sqlx::query("DELETE FROM prompt_cache").execute(pool).await,
            };
            if let Err(e) = result {
                warn!(error = %e, "durable cache invalidate failed");
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let hot = self.hot.read().await;
        let hits = self.hits.load(std::sync::atomic::Ordering::Relaxed);
        let misses = self.misses.load(std::sync::atomic::Ordering::Relaxed);
        let total = hits + misses;

        let mut framework_counts: HashMap<String, u64> = HashMap::new();
        for entry in hot.entries.values() {
            for fw in &entry.entry.frameworks {
                *framework_counts.entry(fw.clone()).or_insert(0) += 1;
            }
        }
        let mut top_frameworks: Vec<(String, u64)> = framework_counts.into_iter().collect();
        top_frameworks.sort_by(|a, b| b.1.cmp(&a.1));

        CacheStats {
            total_entries: hot.entries.len() as u64,
            total_hits: hits,
            total_misses: misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            average_response_millis: 0.0,
            size_bytes: hot.total_bytes as u64,
            top_frameworks: top_frameworks.into_iter().take(5).map(|(f, _)| f).collect(),
        }
    }

    /// Run `build` exactly once across all concurrent callers sharing `key`
    /// while a build is in flight (single-flight). Callers that arrive
    /// after the build completes get a fresh `lookup`/`build` pair instead.
    ///
    /// Does not distinguish a soft-stale hit from a fresh one — callers that
    /// need to schedule a background refresh on staleness should call
    /// `lookup` directly instead, as `EnhanceOrchestrator::enhance_inner` does.
    pub async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> EnhancedResponse
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = EnhancedResponse>,
    {
        if let Some((entry, _stale)) = self.lookup(key).await {
            debug!(cache_key = %key, "prompt cache hit");
            return entry.value;
        }

        let mut table = self.in_flight.lock().await;
        if let Some(existing) = table.get(key).cloned() {
            drop(table);
            // Check-create-check-await: `notified()` only delivers
            // notifications sent after it is created (or between creation
            // and the first poll), so the result must be checked both
            // before and after creating the future to avoid a missed
            // wakeup if the in-flight build finishes in between.
            loop {
                if let Some(result) = existing.result.lock().await.clone() {
                    return result;
                }
                let notified = existing.notify.notified();
                if let Some(result) = existing.result.lock().await.clone() {
                    return result;
                }
                notified.await;
            }
        }

        let slot = Arc::new(InFlight {
            notify: Arc::new(Notify::new()),
            result: Mutex::new(None),
        });
        table.insert(key.to_string(), slot.clone());
        drop(table);

        let result = build().await;
        *slot.result.lock().await = Some(result.clone());
        slot.notify.notify_waiters();

        self.in_flight.lock().await.remove(key);
        info!(cache_key = %key, "prompt cache miss, built fresh response");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContextUsed;

    fn sample_response(text: &str) -> EnhancedResponse {
        EnhancedResponse {
            enhanced_prompt: text.to_string(),
            context_used: ContextUsed {
                repo_facts: Vec::new(),
                code_snippets: Vec::new(),
                context7_docs: Vec::new(),
                todos: Vec::new(),
            },
            frameworks_detected: Vec::new(),
            curation_metrics: None,
            breakdown: None,
            success: true,
        }
    }

    #[tokio::test]
    async fn store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PromptCache::open(&dir.path().join("cache.db"), CacheSettings::default()).await;
        cache.store("k1", sample_response("hello"), vec!["react".to_string()], Some(8.0)).await;
        let (found, stale) = cache.lookup("k1").await.unwrap();
        assert_eq!(found.value.enhanced_prompt, "hello");
        assert!(!stale);
    }

    #[tokio::test]
    async fn expired_entry_within_soft_window_is_served_stale() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = CacheSettings::default();
        settings.ttl = std::time::Duration::from_secs(0);
        settings.soft_refresh_window = std::time::Duration::from_secs(3600);
        let cache = PromptCache::open(&dir.path().join("cache.db"), settings).await;
        cache.store("k1", sample_response("hello"), Vec::new(), Some(8.0)).await;

        let (found, stale) = cache.lookup("k1").await.unwrap();
        assert_eq!(found.value.enhanced_prompt, "hello");
        assert!(stale);
    }

    #[tokio::test]
    async fn entry_past_soft_window_is_a_true_miss() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = CacheSettings::default();
        settings.ttl = std::time::Duration::from_secs(0);
        settings.soft_refresh_window = std::time::Duration::from_secs(0);
        let cache = PromptCache::open(&dir.path().join("cache.db"), settings).await;
        cache.store("k1", sample_response("hello"), Vec::new(), Some(8.0)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert!(cache.lookup("k1").await.is_none());
    }

    #[tokio::test]
    async fn quality_floor_hides_low_score_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = CacheSettings::default();
        settings.quality_floor = 9.0;
        let cache = PromptCache::open(&dir.path().join("cache.db"), settings).await;
        cache.store("k1", sample_response("hello"), Vec::new(), Some(5.0)).await;
        assert!(cache.lookup("k1").await.is_none());
    }

    #[tokio::test]
    async fn fingerprint_is_stable_regardless_of_key_order() {
        let a = PromptCache::fingerprint(&CacheKeyInput {
            prompt: "hi",
            context: &serde_json::json!({"a": 1, "b": 2}),
            options: &serde_json::json!({}),
        });
        let b = PromptCache::fingerprint(&CacheKeyInput {
            prompt: "hi",
            context: &serde_json::json!({"b": 2, "a": 1}),
            options: &serde_json::json!({}),
        });
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn single_flight_runs_build_once_for_concurrent_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(PromptCache::open(&dir.path().join("cache.db"), CacheSettings::default()).await);
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build("shared-key", || async move {
                        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        sample_response("built")
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
