use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Splitter overlap must stay below the window size.
    #[error("TEXT_SPLITTER_CHUNK_OVERLAP ({overlap}) must be smaller than TEXT_SPLITTER_CHUNK_SIZE ({size})")]
    OverlapTooLarge {
        /// Configured window size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Runtime configuration for the document QA service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned by the `ingest` command.
    pub document_path: PathBuf,
    /// Shared secret expected in the `X-API-Key` header.
    pub api_key: String,
    /// Port the HTTP server binds to.
    pub server_port: u16,
    /// Base URL of the Ollama runtime serving embeddings and completions.
    pub ollama_url: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Completion model used to answer questions.
    pub completion_model: String,
    /// Vector index backend.
    pub vector_store: VectorStoreBackend,
    /// Directory holding the local index file.
    pub persist_directory: PathBuf,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for document storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Splitter window size in characters.
    pub text_splitter_chunk_size: usize,
    /// Splitter overlap in characters.
    pub text_splitter_chunk_overlap: usize,
    /// Timeout applied to every outbound HTTP request.
    pub request_timeout: Duration,
    /// Largest accepted upload body in bytes.
    pub max_upload_bytes: usize,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing encoder.
    Hash,
}

/// Supported vector index backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreBackend {
    /// In-process index persisted under `PERSIST_DIRECTORY`.
    Local,
    /// Remote Qdrant collection.
    Qdrant,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            document_path: load_env_or("DOCUMENT_PATH", "data").into(),
            api_key: load_env_or("API_KEY", "secret"),
            server_port: parse_env_or("SERVER_PORT", 8001)?,
            ollama_url: load_env_or("OLLAMA_URL", "http://ollama:11434"),
            embedding_provider: parse_env_or("EMBEDDING_PROVIDER", EmbeddingProvider::Ollama)?,
            embedding_model: load_env_or("EMBEDDING_MODEL", "all-minilm"),
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", 384)?,
            completion_model: load_env_or("COMPLETION_MODEL", "llama3.2:1b"),
            vector_store: parse_env_or("VECTOR_STORE", VectorStoreBackend::Local)?,
            persist_directory: load_env_or("PERSIST_DIRECTORY", "embeddings_store").into(),
            qdrant_url: load_env_or("QDRANT_URL", "http://qdrant:6333"),
            qdrant_collection_name: load_env_or("QDRANT_COLLECTION_NAME", "my_collection"),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            text_splitter_chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", 800)?,
            text_splitter_chunk_overlap: parse_env_or("TEXT_SPLITTER_CHUNK_OVERLAP", 80)?,
            request_timeout: Duration::from_secs(parse_env_or("REQUEST_TIMEOUT_SECS", 120)?),
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                size: self.text_splitter_chunk_size,
                overlap: self.text_splitter_chunk_overlap,
            });
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl FromStr for VectorStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
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
pub fn init_config() -> Result<(), ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    // A second initialization keeps the first configuration.
    let _ = CONFIG.set(config);
    Ok(())
}

#[cfg(test)]
impl Config {
    /// Defaults suitable for unit tests: hashing embedder and in-memory friendly settings.
    pub(crate) fn for_tests() -> Self {
        Self {
            document_path: "data".into(),
            api_key: "secret".into(),
            server_port: 8001,
            ollama_url: "http://127.0.0.1:11434".into(),
            embedding_provider: EmbeddingProvider::Hash,
            embedding_model: "all-minilm".into(),
            embedding_dimension: 384,
            completion_model: "llama3.2:1b".into(),
            vector_store: VectorStoreBackend::Local,
            persist_directory: "embeddings_store".into(),
            qdrant_url: "http://127.0.0.1:6333".into(),
            qdrant_collection_name: "my_collection".into(),
            qdrant_api_key: None,
            text_splitter_chunk_size: 800,
            text_splitter_chunk_overlap: 80,
            request_timeout: Duration::from_secs(5),
            max_upload_bytes: 1024,
        }
    }
}
