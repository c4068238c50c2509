//! Environment-driven configuration.
//!
//! A `Default` impl provides sane local defaults, overridable by an
//! optional `promptmcp.toml` and then by environment variables, using the
//! `config` crate for the layering and `dotenvy` to load a local `.env`
//! before the process reads its environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context7Config {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Max libraries resolved/fetched concurrently.
    pub fan_out: usize,
    /// Per-request timeout.
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// Total budget for all Context7 calls within one stage.
    #[serde(with = "duration_millis")]
    pub stage_deadline: Duration,
    /// Memo TTL for resolved library ids.
    #[serde(with = "duration_millis")]
    pub memo_ttl: Duration,
}

impl Default for Context7Config {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://context7.com/api".to_string(),
            api_key: None,
            fan_out: 4,
            request_timeout: Duration::from_secs(5),
            stage_deadline: Duration::from_secs(10),
            memo_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f64,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.3,
            request_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub hot_capacity_entries: usize,
    pub hot_capacity_bytes: usize,
    #[serde(with = "duration_millis")]
    pub ttl: Duration,
    #[serde(with = "duration_millis")]
    pub soft_refresh_window: Duration,
    pub quality_floor: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            hot_capacity_entries: 1000,
            hot_capacity_bytes: 64 * 1024 * 1024,
            ttl: Duration::from_secs(24 * 3600),
            soft_refresh_window: Duration::from_secs(3600),
            quality_floor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAnalyzerSettings {
    pub max_depth: usize,
    pub max_files: usize,
    pub max_file_bytes: usize,
    pub max_facts: usize,
    pub top_k_snippets: usize,
    pub snippet_char_bound: usize,
    #[serde(with = "duration_millis")]
    pub deadline: Duration,
}

impl Default for ProjectAnalyzerSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_files: 500,
            max_file_bytes: 200 * 1024,
            max_facts: 40,
            top_k_snippets: 5,
            snippet_char_bound: 1500,
            deadline: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorSettings {
    pub quality_floor: f64,
    pub target_token_reduction: f64,
    #[serde(with = "duration_millis")]
    pub per_document_deadline: Duration,
    #[serde(with = "duration_millis")]
    pub cache_ttl: Duration,
}

impl Default for CuratorSettings {
    fn default() -> Self {
        Self {
            quality_floor: 6.0,
            target_token_reduction: 0.70,
            per_document_deadline: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownSettings {
    pub max_tasks: usize,
    #[serde(with = "duration_millis")]
    pub deadline: Duration,
}

impl Default for BreakdownSettings {
    fn default() -> Self {
        Self {
            max_tasks: 10,
            deadline: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    pub max_outbound_requests: usize,
    #[serde(with = "duration_millis")]
    pub call_deadline: Duration,
    #[serde(with = "duration_millis")]
    pub detection_deadline: Duration,
    #[serde(with = "duration_millis")]
    pub builder_deadline: Duration,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            max_outbound_requests: 8,
            call_deadline: Duration::from_secs(30),
            detection_deadline: Duration::from_secs(1),
            builder_deadline: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub workspace_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub default_max_tokens: usize,
    pub context7: Context7Config,
    pub llm: LlmConfig,
    pub cache: CacheSettings,
    pub analyzer: ProjectAnalyzerSettings,
    pub curator: CuratorSettings,
    pub breakdown: BreakdownSettings,
    pub concurrency: ConcurrencySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_path: PathBuf::from("."),
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            default_max_tokens: 4000,
            context7: Context7Config::default(),
            llm: LlmConfig::default(),
            cache: CacheSettings::default(),
            analyzer: ProjectAnalyzerSettings::default(),
            curator: CuratorSettings::default(),
            breakdown: BreakdownSettings::default(),
            concurrency: ConcurrencySettings::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptmcp")
}

impl Config {
    /// Load `.env`, then layer `promptmcp.toml` (if present) and
    /// `PROMPTMCP_`-prefixed environment variables over the defaults via
    /// the `config` crate, then let the well-known unprefixed variable
    /// names (`WORKSPACE_PATH`, `OPENAI_API_KEY`, ...) win last.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let defaults = Config::default();
        let layered = ::config::Config::builder()
            .add_source(::config::Config::try_from(&defaults)?)
            .add_source(::config::File::with_name("promptmcp").required(false))
            .add_source(::config::Environment::with_prefix("PROMPTMCP").separator("__"))
            .build()?;
        let mut cfg: Config = layered.try_deserialize().unwrap_or(defaults);

        if let Ok(path) = std::env::var("WORKSPACE_PATH") {
            cfg.workspace_path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        if let Ok(enabled) = std::env::var("CONTEXT7_ENABLED") {
            cfg.context7.enabled = parse_bool(&enabled, cfg.context7.enabled);
        }
        if let Ok(url) = std::env::var("CONTEXT7_BASE_URL") {
            cfg.context7.base_url = url;
        }
        if let Ok(key) = std::env::var("CONTEXT7_API_KEY") {
            cfg.context7.api_key = Some(key);
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            cfg.llm.api_key = Some(key);
            cfg.llm.enabled = true;
        }
        if let Ok(model) = std::env::var("PROMPTMCP_LLM_MODEL") {
            cfg.llm.model = model;
        }

        Ok(cfg)
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("promptmcp.db")
    }

    pub fn todo_db_path(&self) -> PathBuf {
        self.data_dir.join("todos.db")
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_deadlines() {
        let cfg = Config::default();
        assert_eq!(cfg.concurrency.call_deadline, Duration::from_secs(30));
        assert_eq!(cfg.context7.fan_out, 4);
        assert_eq!(cfg.breakdown.max_tasks, 10);
    }

    #[test]
    fn parse_bool_falls_back_to_default() {
        assert!(parse_bool("true", false));
        assert!(!parse_bool("false", true));
        assert!(parse_bool("garbage", true));
    }
}
