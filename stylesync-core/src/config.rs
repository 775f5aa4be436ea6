use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StyleSyncConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub dashboard_path: String,
    pub upload_dir: String,
    pub max_upload_mb: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            dashboard_path: "dashboard.html".to_string(),
            upload_dir: "uploads".to_string(),
            max_upload_mb: 10,
        }
    }
}

impl HttpConfig {
    pub fn dashboard_path(&self) -> String {
        expand_path(&self.dashboard_path)
    }

    pub fn upload_dir(&self) -> String {
        expand_path(&self.upload_dir)
    }
}

/// Embedding model settings. `dimensions` is the fixed vector length of the
/// memory index; every stored and queried vector must match it.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "gemini-embedding-001".to_string(),
            dimensions: crate::embeddings::GEMINI_DIMENSIONS,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// One of `pinecone`, `pgvector`, `memory`.
    pub backend: String,
    pub index_name: String,
    pub metric: String,
    pub top_k: usize,
    pub relevance_threshold: f32,
    pub max_keywords: usize,
    pub cloud: String,
    pub region: String,
    pub readiness_poll_ms: u64,
    pub readiness_max_attempts: u32,
    pub seed_on_startup: bool,
    pub namespace: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: "pinecone".to_string(),
            index_name: "stylesync-index-v2".to_string(),
            metric: "cosine".to_string(),
            top_k: 5,
            relevance_threshold: 0.5,
            max_keywords: 10,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            readiness_poll_ms: 1000,
            readiness_max_attempts: 60,
            seed_on_startup: true,
            namespace: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    pub model: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

impl StyleSyncConfig {
    /// Load `path` (optional) layered under `STYLESYNC_*` environment overrides,
    /// e.g. `STYLESYNC_HTTP__PORT=8080`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("STYLESYNC").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}

/// API keys and endpoints, read from the process environment only.
///
/// A missing value is never an error here; each component decides how to
/// degrade when its credential is absent.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub webhook_url: Option<String>,
    pub database_url: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: env_var("GEMINI_API_KEY").or_else(|| env_var("GOOGLE_API_KEY")),
            groq_api_key: env_var("GROQ_API_KEY"),
            pinecone_api_key: env_var("PINECONE_API_KEY"),
            webhook_url: env_var("N8N_WEBHOOK_URL"),
            database_url: env_var("DATABASE_URL"),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        f.debug_struct("Credentials")
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("groq_api_key", &mask(&self.groq_api_key))
            .field("pinecone_api_key", &mask(&self.pinecone_api_key))
            .field("webhook_url", &self.webhook_url)
            .field("database_url", &mask(&self.database_url))
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn expand_path(raw: &str) -> String {
    match shellexpand::full(raw) {
        Ok(p) => p.into_owned(),
        Err(e) => {
            tracing::warn!(path = raw, error = %e, "Path expansion failed, using it verbatim");
            raw.to_string()
        }
    }
}
