use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    pub knowledge_base: KnowledgeBaseConfig,
    pub chat: ChatConfig,
    pub stt: SttConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(format!("unknown LLM provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub openai_model: String,
    pub anthropic_model: String,
    pub timeout_seconds: u64,
    /// Hard upper bound on `max_tokens` for any generation.
    pub max_tokens_ceiling: u32,
    pub default_max_tokens: u32,
    pub temperature: f32,
    pub summarize_temperature: f32,
    pub summarize_keywords: Vec<String>,
    pub long_conversation_messages: usize,
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        match self.provider {
            LlmProvider::OpenAi => &self.openai_model,
            LlmProvider::Anthropic => &self.anthropic_model,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            openai_model: "gpt-4-turbo".to_string(),
            anthropic_model: "claude-3-5-sonnet-latest".to_string(),
            timeout_seconds: 60,
            max_tokens_ceiling: 1500,
            default_max_tokens: 1000,
            temperature: 0.7,
            summarize_temperature: 0.3,
            summarize_keywords: vec![
                "summarize".to_string(),
                "summarise".to_string(),
                "summary".to_string(),
                "สรุป".to_string(),
            ],
            long_conversation_messages: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            dimension: 3072,
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreBackend {
    #[default]
    Qdrant,
    InMemory,
}

impl FromStr for VectorStoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "in_memory" | "memory" => Ok(Self::InMemory),
            other => Err(format!("unknown vector store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub url: String,
    pub collection: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::Qdrant,
            url: "http://localhost:6334".to_string(),
            collection: "eyeqcheck-knowledge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_docs: usize,
    pub candidate_multiplier: usize,
    pub vector_weight: f32,
    pub keyword_weight: f32,
    pub timeout_seconds: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_docs: 4,
            candidate_multiplier: 2,
            vector_weight: 0.5,
            keyword_weight: 0.5,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    pub path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub index_on_startup: bool,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/knowledge"),
            chunk_size: 500,
            chunk_overlap: 50,
            index_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// How long a finished reply is served to identical requests. 0 shares
    /// only in-flight generations.
    pub dedup_window_seconds: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            dedup_window_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub model: String,
    pub base_url: String,
    pub max_file_size_bytes: usize,
    pub min_file_size_bytes: usize,
    pub default_language: String,
    pub supported_languages: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_file_size_bytes: 25 * 1024 * 1024,
            min_file_size_bytes: 1024,
            default_language: "th".to_string(),
            supported_languages: vec!["th".to_string(), "en".to_string(), "auto".to_string()],
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// API keys. Only ever read from the environment, never from the YAML file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub system: String,
    pub context_header: String,
    pub no_context: String,
    pub summarize: String,
    pub json_only: String,
    pub stt_medical: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: "You are EyeQcheck, an assistant that helps patients and staff with eye \
                     examination questions. Answer clearly and accurately, reply in the language \
                     the user writes in, and recommend seeing an ophthalmologist or optometrist \
                     when symptoms may need professional care. Do not make a diagnosis."
                .to_string(),
            context_header: "Use the following reference material to answer. Cite the source \
                             names you rely on. If the material does not cover the question, \
                             say so."
                .to_string(),
            no_context: "No reference material was found for this question. Answer from general \
                         knowledge and state that the answer is not grounded in the EyeQcheck \
                         knowledge base."
                .to_string(),
            summarize: "Summarize the consultation so far. Respond with a single JSON object with \
                        the keys \"summary\" (string), \"symptoms\" (array of strings), \
                        \"findings\" (array of strings) and \"recommendations\" (array of strings)."
                .to_string(),
            json_only: "Respond with valid JSON only, without code fences or commentary."
                .to_string(),
            stt_medical: "This is a medical consultation about eye examination. Please transcribe \
                          accurately including medical terms related to: vision, eyesight, \
                          myopia, hyperopia, astigmatism, glaucoma, retina, cornea, \
                          ophthalmology, visual acuity, eye pressure, diopter, prescription, \
                          contact lens, glasses."
                .to_string(),
        }
    }
}

const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

impl AppConfig {
    /// Loads the YAML file named by `CONFIG_PATH` (or the default path when it
    /// exists), then applies environment overrides and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("CONFIG_PATH").ok();
        let mut config = match explicit.as_deref() {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg = &mut self.config;

        if let Some(v) = lookup("SERVER_HOST") {
            cfg.server.host = v;
        }
        if let Some(v) = lookup("PORT").or_else(|| lookup("SERVER_PORT")) {
            cfg.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = lookup("ALLOWED_ORIGINS") {
            cfg.cors.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("LLM_PROVIDER") {
            cfg.llm.provider = v.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "LLM_PROVIDER",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("OPENAI_MODEL") {
            cfg.llm.openai_model = v;
        }
        if let Some(v) = lookup("ANTHROPIC_MODEL") {
            cfg.llm.anthropic_model = v;
        }
        if let Some(v) = lookup("MAX_TOKENS") {
            cfg.llm.max_tokens_ceiling = parse_env("MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("TEMPERATURE") {
            cfg.llm.temperature = parse_env("TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("OPENAI_EMBEDDING_MODEL") {
            cfg.embedding.model = v;
        }
        if let Some(v) = lookup("EMBEDDING_DIMENSION") {
            cfg.embedding.dimension = parse_env("EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("VECTOR_STORE_BACKEND") {
            cfg.vector_store.backend = v.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "VECTOR_STORE_BACKEND",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("QDRANT_URL") {
            cfg.vector_store.url = v;
        }
        if let Some(v) = lookup("QDRANT_COLLECTION") {
            cfg.vector_store.collection = v;
        }
        if let Some(v) = lookup("TOP_K") {
            cfg.retrieval.max_docs = parse_env("TOP_K", &v)?;
        }
        if let Some(v) = lookup("KNOWLEDGE_BASE_PATH") {
            cfg.knowledge_base.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WHISPER_MODEL") {
            cfg.stt.model = v;
        }
        if let Some(v) = lookup("STT_DEFAULT_LANGUAGE") {
            cfg.stt.default_language = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            cfg.logging.level = v.to_ascii_lowercase();
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            cfg.logging.format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "pretty" => LogFormat::Text,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "LOG_FORMAT",
                        value: v,
                    })
                }
            };
        }

        cfg.secrets.openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty());
        cfg.secrets.anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty());

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cfg = &self.config;

        if cfg.secrets.openai_api_key.is_none() {
            return Err(ConfigError::Invalid(
                "OPENAI_API_KEY is required (embeddings and speech-to-text use it)".into(),
            ));
        }
        if cfg.llm.provider == LlmProvider::Anthropic && cfg.secrets.anthropic_api_key.is_none() {
            return Err(ConfigError::Invalid(
                "ANTHROPIC_API_KEY is required when LLM_PROVIDER=anthropic".into(),
            ));
        }
        self.validate_tuning()
    }

    pub fn validate_tuning(&self) -> Result<(), ConfigError> {
        let cfg = &self.config;

        if cfg.llm.max_tokens_ceiling == 0 {
            return Err(ConfigError::Invalid("llm.max_tokens_ceiling must be positive".into()));
        }
        if cfg.llm.default_max_tokens > cfg.llm.max_tokens_ceiling {
            return Err(ConfigError::Invalid(format!(
                "llm.default_max_tokens ({}) exceeds llm.max_tokens_ceiling ({})",
                cfg.llm.default_max_tokens, cfg.llm.max_tokens_ceiling
            )));
        }
        for (name, t) in [
            ("llm.temperature", cfg.llm.temperature),
            ("llm.summarize_temperature", cfg.llm.summarize_temperature),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        let r = &cfg.retrieval;
        if r.vector_weight < 0.0 || r.keyword_weight < 0.0 || r.vector_weight + r.keyword_weight <= 0.0 {
            return Err(ConfigError::Invalid(
                "retrieval weights must be non-negative and not both zero".into(),
            ));
        }
        if r.max_docs == 0 || r.candidate_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.max_docs and retrieval.candidate_multiplier must be positive".into(),
            ));
        }
        let kb = &cfg.knowledge_base;
        if kb.chunk_size == 0 || kb.chunk_overlap >= kb.chunk_size {
            return Err(ConfigError::Invalid(
                "knowledge_base.chunk_overlap must be smaller than a positive chunk_size".into(),
            ));
        }
        if cfg.stt.min_file_size_bytes >= cfg.stt.max_file_size_bytes {
            return Err(ConfigError::Invalid(
                "stt.min_file_size_bytes must be below stt.max_file_size_bytes".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}
