use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the prescription summarization service.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the multimodal extraction service.
    pub extraction_url: String,
    /// Optional API key sent to the extraction service.
    pub extraction_api_key: Option<String>,
    /// Base URL of the embedding service.
    pub embedding_url: String,
    /// Base URL of the text generation service.
    pub generation_url: String,
    /// Dimensionality of the vectors produced by the embedding service.
    pub embedding_dimension: usize,
    /// Vector index backend used for retrieval.
    pub index_backend: IndexBackend,
    /// Base URL of the Qdrant instance (required for the qdrant backend).
    pub qdrant_url: Option<String>,
    /// Name of the Qdrant collection holding prescription units.
    pub qdrant_collection_name: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Maximum token budget per free-text note chunk.
    pub note_chunk_tokens: usize,
    /// Number of units requested from the index per retrieval.
    pub retrieval_top_k: usize,
    /// Number of additional attempts allowed after a transient service failure.
    pub transient_retry_limit: usize,
    /// Timeout applied to extraction calls, in seconds.
    pub extraction_timeout_secs: u64,
    /// Timeout applied to embedding calls, in seconds.
    pub embedding_timeout_secs: u64,
    /// Timeout applied to generation calls, in seconds.
    pub generation_timeout_secs: u64,
    /// Behavior when the embedding step fails for a document.
    pub embedding_failure_mode: EmbeddingFailureMode,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported vector index backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// In-process index held in memory.
    Memory,
    /// Qdrant collection accessed over HTTP.
    Qdrant,
}

/// Behavior selected when embedding a document's units fails.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingFailureMode {
    /// Abort the pipeline run.
    Fail,
    /// Skip indexing and serve retrieval from the un-embedded units.
    TextOnly,
}

const DEFAULT_NOTE_CHUNK_TOKENS: usize = 120;
const DEFAULT_RETRIEVAL_TOP_K: usize = 8;
const DEFAULT_TRANSIENT_RETRY_LIMIT: usize = 1;
const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 15;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            extraction_url: load_env("EXTRACTION_URL")?,
            extraction_api_key: load_env_optional("EXTRACTION_API_KEY"),
            embedding_url: load_env("EMBEDDING_URL")?,
            generation_url: load_env("GENERATION_URL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            index_backend: load_env_optional("INDEX_BACKEND")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("INDEX_BACKEND".to_string()))
                })
                .transpose()?
                .unwrap_or(IndexBackend::Memory),
            qdrant_url: load_env_optional("QDRANT_URL"),
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME"),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            note_chunk_tokens: parse_optional("NOTE_CHUNK_TOKENS", DEFAULT_NOTE_CHUNK_TOKENS)?,
            retrieval_top_k: parse_optional("RETRIEVAL_TOP_K", DEFAULT_RETRIEVAL_TOP_K)?,
            transient_retry_limit: parse_optional(
                "TRANSIENT_RETRY_LIMIT",
                DEFAULT_TRANSIENT_RETRY_LIMIT,
            )?,
            extraction_timeout_secs: parse_optional(
                "EXTRACTION_TIMEOUT_SECS",
                DEFAULT_EXTRACTION_TIMEOUT_SECS,
            )?,
            embedding_timeout_secs: parse_optional(
                "EMBEDDING_TIMEOUT_SECS",
                DEFAULT_EMBEDDING_TIMEOUT_SECS,
            )?,
            generation_timeout_secs: parse_optional(
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?,
            embedding_failure_mode: load_env_optional("EMBEDDING_FAILURE_MODE")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("EMBEDDING_FAILURE_MODE".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(EmbeddingFailureMode::Fail),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

impl std::str::FromStr for IndexBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingFailureMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "text-only" | "textonly" => Ok(Self::TextOnly),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        extraction_url = %config.extraction_url,
        embedding_url = %config.embedding_url,
        generation_url = %config.generation_url,
        index_backend = ?config.index_backend,
        embedding_failure_mode = ?config.embedding_failure_mode,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_backend_parses_known_values() {
        assert_eq!("memory".parse::<IndexBackend>(), Ok(IndexBackend::Memory));
        assert_eq!("Qdrant".parse::<IndexBackend>(), Ok(IndexBackend::Qdrant));
        assert!("redis".parse::<IndexBackend>().is_err());
    }

    #[test]
    fn embedding_failure_mode_parses_known_values() {
        assert_eq!(
            "fail".parse::<EmbeddingFailureMode>(),
            Ok(EmbeddingFailureMode::Fail)
        );
        assert_eq!(
            "text-only".parse::<EmbeddingFailureMode>(),
            Ok(EmbeddingFailureMode::TextOnly)
        );
        assert!("silent".parse::<EmbeddingFailureMode>().is_err());
    }
}
