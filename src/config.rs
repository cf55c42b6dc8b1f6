use crate::search::{SearchMode, SearchScope};
use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

/// Hard ceiling for result counts; configuration may lower it, never raise it.
pub const MAX_LIMIT: usize = 50;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_LIMIT: usize = 20;
/// Weight of the keyword signal in hybrid mode; semantic gets the remainder.
pub const DEFAULT_HYBRID_KEYWORD_WEIGHT: f32 = 0.6;
const DEFAULT_SEMANTIC_TIMEOUT_MS: u64 = 1500;

const DEFAULT_SEMANTIC_MODEL: &str = "bge-base-en-v1.5";
/// Minimum cosine similarity for a semantic candidate.
const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.35;

const DEFAULT_CLIENT_ADDR: &str = "http://127.0.0.1:8080";
const DEFAULT_DEBOUNCE_MS: u64 = 280;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Server-side defaults and ranking tunables for `/search`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Mode used when the caller sends none or an unknown one
    #[serde(default = "default_server_mode")]
    pub default_mode: SearchMode,

    #[serde(default = "default_scope")]
    pub default_scope: SearchScope,

    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper clamp for `limit`, at most `MAX_LIMIT`
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Keyword share of the hybrid score, [0.0, 1.0]
    #[serde(default = "default_hybrid_keyword_weight")]
    pub hybrid_keyword_weight: f32,

    /// Budget for the semantic path; exceeding it degrades to keyword
    #[serde(default = "default_semantic_timeout_ms")]
    pub semantic_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_mode: default_server_mode(),
            default_scope: default_scope(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            hybrid_keyword_weight: default_hybrid_keyword_weight(),
            semantic_timeout_ms: default_semantic_timeout_ms(),
        }
    }
}

fn default_server_mode() -> SearchMode {
    SearchMode::Hybrid
}

fn default_scope() -> SearchScope {
    SearchScope::Compact
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_max_limit() -> usize {
    MAX_LIMIT
}

fn default_hybrid_keyword_weight() -> f32 {
    DEFAULT_HYBRID_KEYWORD_WEIGHT
}

fn default_semantic_timeout_ms() -> u64 {
    DEFAULT_SEMANTIC_TIMEOUT_MS
}

/// Configuration for semantic search functionality
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Enable or disable semantic search
    #[serde(default)]
    pub enabled: bool,

    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Default similarity threshold [0.0, 1.0]
    #[serde(default = "default_semantic_threshold")]
    pub default_threshold: f32,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: DEFAULT_SEMANTIC_MODEL.to_string(),
            default_threshold: DEFAULT_SEMANTIC_THRESHOLD,
        }
    }
}

fn default_semantic_model() -> String {
    DEFAULT_SEMANTIC_MODEL.to_string()
}

fn default_semantic_threshold() -> f32 {
    DEFAULT_SEMANTIC_THRESHOLD
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token -> user id
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

/// Settings for the interactive client (`recall watch`, `recall search`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_addr")]
    pub addr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_server_mode")]
    pub default_mode: SearchMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: default_client_addr(),
            token: None,
            debounce_ms: default_debounce_ms(),
            default_mode: default_server_mode(),
        }
    }
}

fn default_client_addr() -> String {
    DEFAULT_CLIENT_ADDR.to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&mut self) -> anyhow::Result<()> {
        let search = &mut self.search;
        if search.max_limit == 0 {
            bail!("search.max_limit must be greater than 0");
        }
        if search.max_limit > MAX_LIMIT {
            log::warn!(
                "search.max_limit {} exceeds the hard ceiling, using {MAX_LIMIT}",
                search.max_limit
            );
            search.max_limit = MAX_LIMIT;
        }
        search.default_limit = search.default_limit.clamp(1, search.max_limit);

        if !(0.0..=1.0).contains(&search.hybrid_keyword_weight) {
            bail!(
                "search.hybrid_keyword_weight must be between 0.0 and 1.0, got {}",
                search.hybrid_keyword_weight
            );
        }
        if search.semantic_timeout_ms == 0 {
            bail!("search.semantic_timeout_ms must be greater than 0");
        }

        // validate semantic_search config
        let sem = &self.semantic_search;
        if !(0.0..=1.0).contains(&sem.default_threshold) {
            bail!(
                "semantic_search.default_threshold must be between 0.0 and 1.0, got {}",
                sem.default_threshold
            );
        }

        for (token, user) in &self.auth.tokens {
            if token.trim().is_empty() || user.trim().is_empty() {
                bail!("auth.tokens entries must have a non-empty token and user id");
            }
        }

        if self.client.debounce_ms == 0 {
            bail!("client.debounce_ms must be greater than 0");
        }

        Ok(())
    }

    pub fn load_with(base_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;
        let config_path = base_path.join("config.yaml");

        // create new if does not exist
        if !config_path.exists() {
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path;

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        let config_path = self.base_path.join("config.yaml");
        let temp_path = self.base_path.join("config.yaml.tmp");

        std::fs::write(&temp_path, config_str)?;
        std::fs::rename(&temp_path, &config_path)?;
        Ok(())
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    pub fn bookmarks_path(&self) -> PathBuf {
        self.base_path.join("bookmarks.csv")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.base_path.join("vectors")
    }

    /// Client settings with `RECALL_ADDR` / `RECALL_AUTH_TOKEN` applied.
    pub fn client_with_env(&self) -> ClientConfig {
        let mut client = self.client.clone();
        if let Ok(addr) = std::env::var("RECALL_ADDR") {
            client.addr = addr;
        }
        if let Some(token) = std::env::var("RECALL_AUTH_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
        {
            client.token = Some(token);
        }
        client
    }
}

/// Resolves the data directory: `RECALL_BASE_PATH` or `~/.local/share/recall`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("RECALL_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/recall"))
}
