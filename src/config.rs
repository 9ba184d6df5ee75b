use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
        }
    }
}

fn default_markers() -> Vec<String> {
    vec![
        "Software Requirements Specification".to_string(),
        "SRS".to_string(),
    ]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separator")]
    pub separator: char,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separator: default_separator(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_separator() -> char {
    '\n'
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub condense_question: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            condense_question: false,
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    /// Expected vector length; the index rejects vectors of any other size.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("text-embedding-ada-002".to_string())
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_provider")]
    pub provider: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_oracle_provider(),
            model: default_oracle_model(),
            base_url: default_oracle_base_url(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

fn default_oracle_provider() -> String {
    "openai".to_string()
}
fn default_oracle_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_oracle_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_oracle_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GenerationConfig {
    /// Replaces the built-in system template. Must contain `{context}`
    /// and `{question}`.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    #[serde(default)]
    pub default_count: Option<u8>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_true")]
    pub require_script: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            require_script: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub archive: bool,
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    #[serde(default = "default_text_name")]
    pub text_name: String,
    #[serde(default = "default_true")]
    pub namespace_by_query: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            archive: true,
            archive_name: default_archive_name(),
            text_name: default_text_name(),
            namespace_by_query: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./test_cases")
}
fn default_archive_name() -> String {
    "test_cases.zip".to_string()
}
fn default_text_name() -> String {
    "all_test_cases.txt".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_execution_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interpreter: default_interpreter(),
            timeout_secs: default_execution_timeout_secs(),
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}
fn default_execution_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Serialize, Clone)]
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
    "127.0.0.1:8501".to_string()
}

impl Config {
    /// All-defaults configuration, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::minimal();
        validate(&config)?;
        Ok(config)
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.loader.markers.iter().all(|m| m.trim().is_empty()) {
        anyhow::bail!("loader.markers must contain at least one non-empty phrase");
    }

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    // Validate oracle
    match config.oracle.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown oracle provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.oracle.temperature) {
        anyhow::bail!("oracle.temperature must be in [0.0, 2.0]");
    }

    if let Some(count) = config.generation.default_count {
        if !(1..=5).contains(&count) {
            anyhow::bail!("generation.default_count must be between 1 and 5");
        }
    }

    if config.output.archive_name.trim().is_empty() || config.output.text_name.trim().is_empty()
    {
        anyhow::bail!("output.archive_name and output.text_name must not be empty");
    }

    if config.execution.timeout_secs == 0 {
        anyhow::bail!("execution.timeout_secs must be > 0");
    }

    Ok(())
}
