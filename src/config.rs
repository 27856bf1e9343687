use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Startup configuration failure. Raised once by [`Config::from_env`], never mid-job.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("ConfigurationError: {key} is required {reason}")]
    Missing { key: &'static str, reason: String },
    #[error("ConfigurationError: {key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Root under which each job clones its repository
    pub scratch_dir: PathBuf,
    /// Branch to clone; `None` follows the remote HEAD
    pub branch: Option<String>,
    /// Git personal access token for cloning private repos
    pub git_token: Option<String>,
    /// Clone timeout in seconds
    pub clone_timeout_secs: u64,
    /// Jobs allowed to run at the same time
    pub max_concurrent_jobs: usize,
    /// Sections composed in parallel within one job
    pub section_concurrency: usize,
    /// How long finished job results stay retrievable
    pub result_ttl_secs: u64,
    /// Origins allowed by the CORS layer
    pub allowed_origins: Vec<String>,
    pub vector_store: VectorStoreConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// "qdrant" or "memory"
    pub kind: String,
    /// Qdrant REST endpoint, e.g. "http://localhost:6333"
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Chunks returned per section query
    pub top_k: usize,
    /// Points written per upsert request
    pub upsert_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai" (any OpenAI-compatible endpoint, including the Hugging Face router)
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for section composition
    pub chat_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Longest silence tolerated between two stream deltas
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "openai"
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub dim: usize,
    /// Texts per embedding request
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            scratch_dir: PathBuf::from("./temp_repos"),
            branch: None,
            git_token: None,
            clone_timeout_secs: 300,
            max_concurrent_jobs: 2,
            section_concurrency: 2,
            result_ttl_secs: 3600,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            vector_store: VectorStoreConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            kind: "qdrant".to_string(),
            url: None,
            api_key: None,
            top_k: 4,
            upsert_batch_size: 64,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://router.huggingface.co".to_string(),
            chat_model: "meta-llama/Llama-3.1-8B-Instruct".to_string(),
            api_key: None,
            idle_timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            api_key: None,
            dim: 384,
            batch_size: 32,
        }
    }
}

impl Config {
    /// Build the configuration from the process environment and validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup and validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("README_FORGE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(dir) = lookup("README_FORGE_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(branch) = non_empty(lookup("README_FORGE_BRANCH")) {
            config.branch = Some(branch);
        }
        if let Some(token) = non_empty(lookup("README_FORGE_GIT_TOKEN")) {
            config.git_token = Some(token);
        }
        if let Some(v) = parse_var(&lookup, "README_FORGE_CLONE_TIMEOUT_SECS")? {
            config.clone_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "README_FORGE_MAX_CONCURRENT_JOBS")? {
            config.max_concurrent_jobs = v;
        }
        if let Some(v) = parse_var(&lookup, "README_FORGE_SECTION_CONCURRENCY")? {
            config.section_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "README_FORGE_RESULT_TTL_SECS")? {
            config.result_ttl_secs = v;
        }
        if let Some(origins) = lookup("README_FORGE_ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        // Vector store
        if let Some(kind) = lookup("VECTOR_STORE") {
            config.vector_store.kind = kind.to_lowercase();
        }
        if let Some(url) = non_empty(lookup("QDRANT_URL")) {
            config.vector_store.url = Some(url);
        }
        if let Some(key) = non_empty(lookup("QDRANT_API_KEY")) {
            config.vector_store.api_key = Some(key);
        }
        if let Some(v) = parse_var(&lookup, "RETRIEVER_TOP_K")? {
            config.vector_store.top_k = v;
        }

        // Chat model
        if let Some(provider) = lookup("LLM_PROVIDER") {
            config.llm.provider = provider.to_lowercase();
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(key) = non_empty(lookup("LLM_API_KEY")).or_else(|| non_empty(lookup("HF_TOKEN"))) {
            config.llm.api_key = Some(key);
        }

        // Embeddings
        if let Some(provider) = lookup("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider.to_lowercase();
        }
        if let Some(url) = lookup("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(key) = non_empty(lookup("EMBEDDING_API_KEY")) {
            config.embedding.api_key = Some(key);
        }
        if let Some(v) = parse_var(&lookup, "EMBEDDING_DIM")? {
            config.embedding.dim = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would only fail once a job is running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.vector_store.kind.as_str() {
            "qdrant" => {
                if self.vector_store.url.is_none() {
                    return Err(ConfigError::Missing {
                        key: "QDRANT_URL",
                        reason: "when VECTOR_STORE=qdrant".to_string(),
                    });
                }
            }
            "memory" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "VECTOR_STORE",
                    value: other.to_string(),
                    reason: "expected \"qdrant\" or \"memory\"".to_string(),
                })
            }
        }

        check_provider("LLM_PROVIDER", &self.llm.provider)?;
        check_provider("EMBEDDING_PROVIDER", &self.embedding.provider)?;

        if self.llm.provider == "openai" && self.llm.api_key.is_none() {
            return Err(ConfigError::Missing {
                key: "LLM_API_KEY",
                reason: "when LLM_PROVIDER=openai (HF_TOKEN is also accepted)".to_string(),
            });
        }

        for (key, value) in [
            ("README_FORGE_MAX_CONCURRENT_JOBS", self.max_concurrent_jobs),
            ("README_FORGE_SECTION_CONCURRENCY", self.section_concurrency),
            ("RETRIEVER_TOP_K", self.vector_store.top_k),
            ("EMBEDDING_DIM", self.embedding.dim),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn check_provider(key: &'static str, provider: &str) -> Result<(), ConfigError> {
    match provider {
        "ollama" | "openai" => Ok(()),
        other => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
            reason: "expected \"ollama\" or \"openai\"".to_string(),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
    }
}
