use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        vector_index::{
            check_dimension, IndexDescription, IndexProfile, IndexedRecord, RecordMetadata,
            ScoredRecord, VectorIndex,
        },
    },
    utils::deadline::with_deadline,
};

const CHUNK_TABLE: &str = "indexed_chunk";
const PROFILE_TABLE: &str = "index_profile";
const PROFILE_KEY: &str = "current";
const VECTOR_INDEX_SERVICE: &str = "vector index";

/// Vector index kept in a SurrealDB table with an HNSW index over `embedding`.
pub struct SurrealVectorIndex {
    db: Arc<SurrealDbClient>,
    dimension: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChunkRow {
    id: String,
    embedding: Vec<f32>,
    text: String,
    source: String,
}

#[derive(Deserialize)]
struct ScoredRow {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    source: String,
    score: f64,
}

#[derive(Deserialize)]
struct CountRow {
    total: u64,
}

impl SurrealVectorIndex {
    pub fn new(db: Arc<SurrealDbClient>, dimension: usize, timeout: Duration) -> Self {
        Self {
            db,
            dimension,
            timeout,
        }
    }

    /// Defines the chunk table and its HNSW index. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        let query = format!(
            "DEFINE TABLE IF NOT EXISTS {CHUNK_TABLE} SCHEMALESS;
             DEFINE INDEX IF NOT EXISTS idx_embedding_{CHUNK_TABLE} ON TABLE {CHUNK_TABLE}
                FIELDS embedding HNSW DIMENSION {dimension} DIST COSINE;",
            dimension = self.dimension,
        );

        let res = self.db.client.query(query).await?;
        res.check()?;

        info!(
            backend = "surrealdb",
            dimension = self.dimension,
            "vector index schema ready"
        );
        Ok(())
    }

    /// Runs one database round trip under the configured request timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: std::future::Future<Output = Result<T, AppError>>,
    {
        with_deadline(VECTOR_INDEX_SERVICE, self.timeout, call).await
    }

    async fn stored_profile(&self) -> Result<Option<IndexProfile>, AppError> {
        self.bounded(async {
            let profile: Option<IndexProfile> =
                self.db.select((PROFILE_TABLE, PROFILE_KEY)).await?;
            Ok(profile)
        })
        .await
    }
}

#[async_trait]
impl VectorIndex for SurrealVectorIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        let rows: Vec<ChunkRow> = records
            .into_iter()
            .map(|record| ChunkRow {
                id: record.id,
                embedding: record.vector,
                text: record.metadata.text,
                source: record.metadata.source,
            })
            .collect();

        let db = Arc::clone(&self.db);
        with_deadline(VECTOR_INDEX_SERVICE, self.timeout, async move {
            let query = format!(
                "FOR $row IN $rows {{
                    UPSERT type::thing('{CHUNK_TABLE}', $row.id) CONTENT {{
                        embedding: $row.embedding,
                        text: $row.text,
                        source: $row.source
                    }};
                }};"
            );
            let res = db.client.query(query).bind(("rows", rows)).await?;
            res.check()?;
            Ok(())
        })
        .await?;

        debug!(backend = "surrealdb", count, "upserted vectors");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, AppError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = vector.to_vec();
        let db = Arc::clone(&self.db);
        let rows: Vec<ScoredRow> = with_deadline(VECTOR_INDEX_SERVICE, self.timeout, async move {
            let query = format!(
                "SELECT meta::id(id) AS id, text, source,
                    vector::similarity::cosine(embedding, $embedding) AS score
                 FROM {CHUNK_TABLE}
                 WHERE embedding <|{top_k},40|> $embedding
                 ORDER BY score DESC"
            );
            let rows: Vec<ScoredRow> = db
                .client
                .query(query)
                .bind(("embedding", embedding))
                .await?
                .take(0)?;
            Ok(rows)
        })
        .await?;

        Ok(rows
            .into_iter()
            .take(top_k)
            .map(|row| ScoredRecord {
                id: row.id,
                metadata: RecordMetadata {
                    text: row.text,
                    source: row.source,
                },
                score: row.score as f32,
            })
            .collect())
    }

    async fn describe(&self) -> Result<IndexDescription, AppError> {
        let count: Option<CountRow> = self
            .bounded(async {
                let mut response = self
                    .db
                    .client
                    .query(format!("SELECT count() AS total FROM {CHUNK_TABLE} GROUP ALL"))
                    .await?;
                Ok(response.take(0)?)
            })
            .await?;
        let profile = self.stored_profile().await?;

        Ok(IndexDescription {
            dimension: Some(profile.map_or(self.dimension, |p| p.dimension)),
            record_count: Some(count.map_or(0, |c| c.total)),
        })
    }

    fn backend_label(&self) -> &'static str {
        "surrealdb"
    }

    /// Records the profile on first use and rejects any later mismatch.
    async fn ensure_profile(&self, profile: &IndexProfile) -> Result<(), AppError> {
        check_dimension(self.backend_label(), Some(self.dimension), profile.dimension)?;

        match self.stored_profile().await? {
            Some(stored) if stored == *profile => Ok(()),
            Some(stored) => Err(AppError::Configuration(format!(
                "surrealdb index was built with {} ({} dimensions), configured embedding is {} ({} dimensions)",
                stored.embedding_model, stored.dimension, profile.embedding_model, profile.dimension
            ))),
            None => {
                let created: Option<IndexProfile> = self
                    .bounded(async {
                        let created: Option<IndexProfile> = self
                            .db
                            .create((PROFILE_TABLE, PROFILE_KEY))
                            .content(profile.clone())
                            .await?;
                        Ok(created)
                    })
                    .await?;
                created.ok_or(AppError::InternalError(
                    "Failed to record index profile".into(),
                ))?;
                info!(
                    backend = "surrealdb",
                    model = %profile.embedding_model,
                    dimension = profile.dimension,
                    "recorded index profile"
                );
                Ok(())
            }
        }
    }
}
