use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::AppError,
    storage::pinecone::{
        http_client, normalize_host, read_json, transport_error, PINECONE_API_VERSION,
    },
};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READY_POLL_ATTEMPTS: u32 = 90;

/// Pinecone control-plane client: looks indexes up by name and creates serverless ones.
pub struct PineconeControlPlane {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    poll_interval: Duration,
    poll_attempts: u32,
}

/// A serverless index to create when it does not exist yet.
#[derive(Debug, Clone)]
pub struct ServerlessIndex<'a> {
    pub name: &'a str,
    pub dimension: usize,
    pub cloud: &'a str,
    pub region: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexModel {
    pub name: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'static str,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

impl PineconeControlPlane {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: normalize_host(base_url),
            api_key: api_key.to_string(),
            timeout,
            poll_interval: READY_POLL_INTERVAL,
            poll_attempts: READY_POLL_ATTEMPTS,
        })
    }

    pub fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts.max(1);
        self
    }

    /// `None` when no index with that name exists.
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexModel>, AppError> {
        let path = format!("/indexes/{name}");
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .send()
            .await
            .map_err(|e| transport_error(&path, &e, self.timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response, &path).await.map(Some)
    }

    /// Data-plane host of an existing index. A missing index is a configuration error.
    pub async fn resolve_host(&self, name: &str) -> Result<String, AppError> {
        let index = self.describe_index(name).await?.ok_or_else(|| {
            AppError::Configuration(format!(
                "pinecone index {name} does not exist; run the ingest command to create it"
            ))
        })?;
        host_of(&index)
    }

    /// Creates the index when it is missing, waits until it is ready, and returns its
    /// data-plane host. An existing index with another dimension is rejected.
    pub async fn ensure_index(&self, spec: &ServerlessIndex<'_>) -> Result<String, AppError> {
        let index = match self.describe_index(spec.name).await? {
            Some(existing) => {
                if let Some(dimension) = existing.dimension.filter(|d| *d != spec.dimension) {
                    return Err(AppError::Configuration(format!(
                        "pinecone index {} has dimension {dimension}, configured embedding produces {}",
                        spec.name, spec.dimension
                    )));
                }
                existing
            }
            None => self.create_index(spec).await?,
        };

        let index = if index.status.ready {
            index
        } else {
            self.wait_until_ready(spec.name).await?
        };
        host_of(&index)
    }

    async fn create_index(&self, spec: &ServerlessIndex<'_>) -> Result<IndexModel, AppError> {
        let path = "/indexes";
        let request = CreateIndexRequest {
            name: spec.name,
            dimension: spec.dimension,
            metric: "cosine",
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: spec.cloud,
                    region: spec.region,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(path, &e, self.timeout))?;

        // Another process created it between our lookup and this request.
        if response.status() == StatusCode::CONFLICT {
            debug!(index = spec.name, "pinecone index already exists");
            return self
                .describe_index(spec.name)
                .await?
                .ok_or_else(|| AppError::VectorStore(format!("pinecone index {} vanished", spec.name)));
        }

        let created: IndexModel = read_json(response, path).await?;
        info!(
            index = %created.name,
            dimension = spec.dimension,
            cloud = spec.cloud,
            region = spec.region,
            "created pinecone index"
        );
        Ok(created)
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexModel, AppError> {
        for attempt in 1..=self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;
            match self.describe_index(name).await? {
                Some(index) if index.status.ready => return Ok(index),
                Some(index) => {
                    debug!(index = name, attempt, state = %index.status.state, "waiting for pinecone index");
                }
                None => debug!(index = name, attempt, "pinecone index not visible yet"),
            }
        }

        Err(AppError::VectorStore(format!(
            "pinecone index {name} was not ready after {} checks",
            self.poll_attempts
        )))
    }
}

fn host_of(index: &IndexModel) -> Result<String, AppError> {
    if index.host.trim().is_empty() {
        return Err(AppError::VectorStore(format!(
            "pinecone index {} has no host yet",
            index.name
        )));
    }
    Ok(index.host.clone())
}
