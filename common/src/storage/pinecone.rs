use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    error::AppError,
    storage::vector_index::{
        IndexDescription, IndexedRecord, RecordMetadata, ScoredRecord, VectorIndex,
    },
    utils::config::PineconeSettings,
};

pub(crate) const PINECONE_API_VERSION: &str = "2024-07";
pub(crate) const VECTOR_INDEX_SERVICE: &str = "vector index";

/// Pinecone data-plane client for a single index host.
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
    timeout: Duration,
}

impl PineconeIndex {
    /// `host` is the index's data-plane host, as configured or resolved by name.
    pub fn new(
        settings: &PineconeSettings<'_>,
        host: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(timeout)?,
            host: normalize_host(host),
            api_key: settings.api_key.to_string(),
            namespace: settings.namespace.map(str::to_string),
            timeout,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, AppError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.host);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(path, &e))?;

        read_json(response, path).await
    }

    fn map_transport_error(&self, path: &str, err: &reqwest::Error) -> AppError {
        transport_error(path, err, self.timeout)
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Configuration(format!("building pinecone client: {e}")))
}

/// Decodes a successful response, or turns an API error body into `VectorStore`.
pub(crate) async fn read_json<R>(response: reqwest::Response, path: &str) -> Result<R, AppError>
where
    R: for<'de> Deserialize<'de>,
{
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);

        error!(backend = "pinecone", %status, path, "API error");
        return Err(AppError::VectorStore(format!(
            "pinecone returned {status}: {detail}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::VectorStore(format!("failed to parse pinecone response: {e}")))
}

pub(crate) fn transport_error(path: &str, err: &reqwest::Error, timeout: Duration) -> AppError {
    if err.is_timeout() {
        return AppError::Timeout {
            service: VECTOR_INDEX_SERVICE,
            after: timeout,
        };
    }
    error!(backend = "pinecone", path, error = %err, "request failed");
    AppError::VectorStore(format!("pinecone request failed: {err}"))
}

/// Data-plane errors carry `message` at the top level, control-plane errors nest it
/// under `error`.
fn error_detail(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ErrorResponse>(body) {
        return err.message;
    }
    if let Ok(err) = serde_json::from_str::<ControlErrorResponse>(body) {
        return err.error.message;
    }
    body.to_string()
}

pub(crate) fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

// ── Pinecone wire types ──────────────────────────────────────────────

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a RecordMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeStatsResponse {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    total_vector_count: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct ControlErrorResponse {
    error: ErrorResponse,
}

impl QueryMatch {
    /// Records written by LangChain keep their text under `pageContent`.
    fn into_scored(self) -> ScoredRecord {
        let metadata = self.metadata.unwrap_or_default();
        let field = |name: &str| metadata.get(name).and_then(Value::as_str).map(str::to_string);

        ScoredRecord {
            metadata: RecordMetadata {
                text: field("text")
                    .or_else(|| field("pageContent"))
                    .unwrap_or_default(),
                source: field("source").unwrap_or_default(),
            },
            id: self.id,
            score: self.score,
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }

        let request = UpsertRequest {
            vectors: records
                .iter()
                .map(|record| PineconeVector {
                    id: &record.id,
                    values: &record.vector,
                    metadata: &record.metadata,
                })
                .collect(),
            namespace: self.namespace.as_deref(),
        };

        let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;
        debug!(
            backend = "pinecone",
            sent = records.len(),
            upserted = response.upserted_count,
            "upserted vectors"
        );

        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, AppError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };

        let response: QueryResponse = self.post("/query", &request).await?;
        let mut matches: Vec<ScoredRecord> = response
            .matches
            .into_iter()
            .map(QueryMatch::into_scored)
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn describe(&self) -> Result<IndexDescription, AppError> {
        let response: DescribeStatsResponse = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await?;

        Ok(IndexDescription {
            dimension: response.dimension,
            record_count: response.total_vector_count,
        })
    }

    fn backend_label(&self) -> &'static str {
        "pinecone"
    }
}
