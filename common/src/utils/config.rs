use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    Pinecone,
    SurrealDb,
}

fn default_vector_store() -> VectorStoreKind {
    VectorStoreKind::Pinecone
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAI,
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::OpenAI
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    pub admin_password: String,
    pub http_port: u16,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    pub embedding_dimensions: u32,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    #[serde(default = "default_vector_store")]
    pub vector_store: VectorStoreKind,
    #[serde(default = "default_pinecone_index_name")]
    pub pinecone_index_name: String,
    pub pinecone_api_key: Option<String>,
    /// Data-plane host; looked up by index name when unset.
    pub pinecone_index_host: Option<String>,
    pub pinecone_namespace: Option<String>,
    #[serde(default = "default_pinecone_control_url")]
    pub pinecone_control_url: String,
    #[serde(default = "default_pinecone_cloud")]
    pub pinecone_cloud: String,
    #[serde(default = "default_pinecone_region")]
    pub pinecone_region: String,
    pub surrealdb_address: Option<String>,
    pub surrealdb_username: Option<String>,
    pub surrealdb_password: Option<String>,
    pub surrealdb_namespace: Option<String>,
    pub surrealdb_database: Option<String>,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
    #[serde(default = "default_ingest_max_file_name_bytes")]
    pub ingest_max_file_name_bytes: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_pinecone_index_name() -> String {
    "doc-chat".to_string()
}

fn default_pinecone_control_url() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_pinecone_cloud() -> String {
    "aws".to_string()
}

fn default_pinecone_region() -> String {
    "us-east-1".to_string()
}

fn default_retrieval_top_k() -> usize {
    3
}

fn default_max_context_chars() -> usize {
    12_000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_ingest_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_ingest_max_file_name_bytes() -> usize {
    255
}

/// Connection settings for the SurrealDB vector store, resolved from the optional fields.
#[derive(Clone, Debug)]
pub struct SurrealSettings<'a> {
    pub address: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub namespace: &'a str,
    pub database: &'a str,
}

/// Connection settings for the Pinecone vector store, resolved from the optional fields.
#[derive(Clone, Debug)]
pub struct PineconeSettings<'a> {
    pub api_key: &'a str,
    pub index_name: &'a str,
    pub index_host: Option<&'a str>,
    pub namespace: Option<&'a str>,
    pub control_url: &'a str,
    /// Serverless placement used when the index has to be created.
    pub cloud: &'a str,
    pub region: &'a str,
}

impl AppConfig {
    /// Checks everything the process needs before it starts serving.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.openai_api_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "openai_api_key must not be empty".into(),
            ));
        }
        if self.admin_password.trim().is_empty() {
            return Err(AppError::Configuration(
                "admin_password must not be empty".into(),
            ));
        }
        if self.embedding_dimensions == 0 {
            return Err(AppError::Configuration(
                "embedding_dimensions must be greater than zero".into(),
            ));
        }
        if self.retrieval_top_k == 0 {
            return Err(AppError::Configuration(
                "retrieval_top_k must be greater than zero".into(),
            ));
        }
        if self.max_context_chars == 0 {
            return Err(AppError::Configuration(
                "max_context_chars must be greater than zero".into(),
            ));
        }

        match self.vector_store {
            VectorStoreKind::Pinecone => self.pinecone_settings().map(|_| ()),
            VectorStoreKind::SurrealDb => self.surreal_settings().map(|_| ()),
        }
    }

    pub fn pinecone_settings(&self) -> Result<PineconeSettings<'_>, AppError> {
        Ok(PineconeSettings {
            api_key: required(self.pinecone_api_key.as_deref(), "pinecone_api_key")?,
            index_name: required(Some(self.pinecone_index_name.as_str()), "pinecone_index_name")?,
            index_host: self
                .pinecone_index_host
                .as_deref()
                .filter(|host| !host.trim().is_empty()),
            namespace: self.pinecone_namespace.as_deref().filter(|ns| !ns.is_empty()),
            control_url: required(Some(self.pinecone_control_url.as_str()), "pinecone_control_url")?,
            cloud: required(Some(self.pinecone_cloud.as_str()), "pinecone_cloud")?,
            region: required(Some(self.pinecone_region.as_str()), "pinecone_region")?,
        })
    }

    pub fn surreal_settings(&self) -> Result<SurrealSettings<'_>, AppError> {
        Ok(SurrealSettings {
            address: required(self.surrealdb_address.as_deref(), "surrealdb_address")?,
            username: required(self.surrealdb_username.as_deref(), "surrealdb_username")?,
            password: required(self.surrealdb_password.as_deref(), "surrealdb_password")?,
            namespace: required(self.surrealdb_namespace.as_deref(), "surrealdb_namespace")?,
            database: required(self.surrealdb_database.as_deref(), "surrealdb_database")?,
        })
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            AppError::Configuration(format!("{name} is required for the selected vector store"))
        })
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            admin_password: String::new(),
            http_port: 3000,
            embedding_backend: default_embedding_backend(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: 1536,
            generation_model: default_generation_model(),
            vector_store: default_vector_store(),
            pinecone_index_name: default_pinecone_index_name(),
            pinecone_api_key: None,
            pinecone_index_host: None,
            pinecone_namespace: None,
            pinecone_control_url: default_pinecone_control_url(),
            pinecone_cloud: default_pinecone_cloud(),
            pinecone_region: default_pinecone_region(),
            surrealdb_address: None,
            surrealdb_username: None,
            surrealdb_password: None,
            surrealdb_namespace: None,
            surrealdb_database: None,
            retrieval_top_k: default_retrieval_top_k(),
            max_context_chars: default_max_context_chars(),
            request_timeout_secs: default_request_timeout_secs(),
            ingest_max_body_bytes: default_ingest_max_body_bytes(),
            ingest_max_file_name_bytes: default_ingest_max_file_name_bytes(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, AppError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    let config: AppConfig = config.try_deserialize()?;
    config.validate()?;

    Ok(config)
}
