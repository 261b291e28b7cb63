use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::AppError,
    storage::vector_index::{IndexDescription, IndexedRecord, ScoredRecord, VectorIndex},
    utils::{admin_secret::AdminSecret, embedding::EmbeddingClient},
};
use tokio::sync::Mutex;

use super::{
    config::{IngestionConfig, IngestionTuning},
    services::PipelineServices,
    DocumentUpload, IngestionPipeline, IngestionRequest,
};
use crate::utils::text_extraction::TextExtractor;

const PASSWORD: &str = "correct horse";
const TEST_EMBEDDING_DIM: usize = 8;

enum Extracted {
    Text(String),
    Unreadable,
}

struct MockExtractor {
    output: Extracted,
    calls: Mutex<usize>,
}

impl MockExtractor {
    fn text(text: impl Into<String>) -> Self {
        Self {
            output: Extracted::Text(text.into()),
            calls: Mutex::new(0),
        }
    }

    fn unreadable() -> Self {
        Self {
            output: Extracted::Unreadable,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract(&self, _document: Bytes) -> Result<String, AppError> {
        *self.calls.lock().await += 1;
        match &self.output {
            Extracted::Text(text) => Ok(text.clone()),
            Extracted::Unreadable => Err(AppError::Extraction("Failed to parse PDF".into())),
        }
    }
}

struct MockEmbedding {
    dimension: usize,
    /// 1-based call number that fails.
    fail_on_call: Option<usize>,
    returned_dimension: usize,
    batches: Mutex<Vec<Vec<String>>>,
}

impl MockEmbedding {
    fn new() -> Self {
        Self {
            dimension: TEST_EMBEDDING_DIM,
            fail_on_call: None,
            returned_dimension: TEST_EMBEDDING_DIM,
            batches: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new()
        }
    }

    fn wrong_dimension() -> Self {
        Self {
            returned_dimension: TEST_EMBEDDING_DIM + 1,
            ..Self::new()
        }
    }

    async fn call_count(&self) -> usize {
        self.batches.lock().await.len()
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut batches = self.batches.lock().await;
        batches.push(texts.to_vec());
        if self.fail_on_call == Some(batches.len()) {
            return Err(AppError::EmbeddingService("rate limited".into()));
        }

        Ok(texts
            .iter()
            .map(|text| vec![text.len() as f32; self.returned_dimension])
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_code(&self) -> String {
        "mock-embedding".into()
    }
}

#[derive(Default)]
struct MockIndex {
    records: Mutex<Vec<IndexedRecord>>,
    upserts: Mutex<usize>,
    /// 1-based upsert call that fails without storing anything.
    fail_on_upsert: Option<usize>,
}

impl MockIndex {
    fn failing_on(upsert: usize) -> Self {
        Self {
            fail_on_upsert: Some(upsert),
            ..Self::default()
        }
    }
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), AppError> {
        let mut upserts = self.upserts.lock().await;
        *upserts += 1;
        if self.fail_on_upsert == Some(*upserts) {
            return Err(AppError::VectorStore("upsert rejected: quota exceeded".into()));
        }
        self.records.lock().await.extend(records);
        Ok(())
    }

    async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<ScoredRecord>, AppError> {
        Ok(Vec::new())
    }

    async fn describe(&self) -> Result<IndexDescription, AppError> {
        Ok(IndexDescription::default())
    }

    fn backend_label(&self) -> &'static str {
        "mock"
    }
}

struct Harness {
    extractor: Arc<MockExtractor>,
    embedding: Arc<MockEmbedding>,
    index: Arc<MockIndex>,
    pipeline: IngestionPipeline,
}

impl Harness {
    fn new(extractor: MockExtractor, embedding: MockEmbedding) -> Self {
        Self::with_tuning(extractor, embedding, IngestionTuning::default())
    }

    fn with_tuning(extractor: MockExtractor, embedding: MockEmbedding, tuning: IngestionTuning) -> Self {
        Self::build(extractor, embedding, MockIndex::default(), tuning)
    }

    fn with_index(extractor: MockExtractor, embedding: MockEmbedding, index: MockIndex) -> Self {
        Self::build(extractor, embedding, index, IngestionTuning::default())
    }

    fn build(
        extractor: MockExtractor,
        embedding: MockEmbedding,
        index: MockIndex,
        tuning: IngestionTuning,
    ) -> Self {
        let extractor = Arc::new(extractor);
        let embedding = Arc::new(embedding);
        let index = Arc::new(index);
        let services = PipelineServices::new(
            AdminSecret::new(PASSWORD),
            Arc::clone(&extractor) as Arc<dyn TextExtractor>,
            Arc::clone(&embedding) as Arc<dyn EmbeddingClient>,
            Arc::clone(&index) as Arc<dyn VectorIndex>,
        );
        let pipeline = IngestionPipeline::with_config(services, IngestionConfig { tuning });

        Self {
            extractor,
            embedding,
            index,
            pipeline,
        }
    }

    async fn extractor_calls(&self) -> usize {
        *self.extractor.calls.lock().await
    }

    async fn upsert_calls(&self) -> usize {
        *self.index.upserts.lock().await
    }

    async fn stored(&self) -> Vec<IndexedRecord> {
        self.index.records.lock().await.clone()
    }
}

fn document_text(len: usize) -> String {
    "Retrieval grounds answers in the uploaded document. "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

fn request(credential: Option<&str>, source_name: &str) -> IngestionRequest {
    IngestionRequest {
        credential: credential.map(str::to_string),
        upload: Some(DocumentUpload {
            source_name: source_name.into(),
            bytes: Bytes::from_static(b"%PDF-1.7 placeholder"),
        }),
    }
}

fn index_suffix(id: &str) -> usize {
    id.rsplit('-')
        .next()
        .and_then(|suffix| suffix.parse().ok())
        .expect("record id ends with the chunk index")
}

#[tokio::test]
async fn ingest_2500_char_document_indexes_four_chunks_in_order() {
    let harness = Harness::new(MockExtractor::text(document_text(2_500)), MockEmbedding::new());

    let report = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "handbook.pdf"))
        .await
        .expect("ingestion succeeds");

    assert_eq!(report.chunk_count, 4);
    assert_eq!(report.batch_count, 1);
    assert_eq!(report.source_name, "handbook.pdf");

    let stored = harness.stored().await;
    assert_eq!(stored.len(), 4);
    let indices: Vec<usize> = stored.iter().map(|r| index_suffix(&r.id)).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    let prefix = format!(
        "handbook.pdf-{}-",
        report.ingestion_timestamp.timestamp_millis()
    );
    assert!(stored.iter().all(|r| r.id.starts_with(&prefix)));
    assert!(stored.iter().all(|r| r.metadata.source == "handbook.pdf"));
    assert!(stored.iter().all(|r| r.vector.len() == TEST_EMBEDDING_DIM));
    assert_eq!(stored[0].metadata.text.chars().count(), 1_000);
    assert_eq!(stored[3].metadata.text.chars().count(), 100);
}

#[tokio::test]
async fn one_chunk_batches_upsert_in_sequence() {
    let harness = Harness::with_tuning(
        MockExtractor::text(document_text(2_500)),
        MockEmbedding::new(),
        IngestionTuning {
            batch_size: 1,
            ..IngestionTuning::default()
        },
    );

    let report = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "handbook.pdf"))
        .await
        .expect("ingestion succeeds");

    assert_eq!(report.batch_count, 4);
    assert_eq!(harness.upsert_calls().await, 4);
    assert_eq!(harness.embedding.call_count().await, 4);

    let indices: Vec<usize> = harness
        .stored()
        .await
        .iter()
        .map(|r| index_suffix(&r.id))
        .collect();
    assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn embedding_failure_on_second_batch_keeps_first_batch_only() {
    // 20 000 chars -> 25 chunks -> batches of 10, 10, 5
    let harness = Harness::new(
        MockExtractor::text(document_text(20_000)),
        MockEmbedding::failing_on(2),
    );

    let err = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "large.pdf"))
        .await
        .expect_err("second batch fails");

    match &err {
        AppError::Interrupted { committed, source } => {
            assert_eq!(*committed, 10);
            assert!(matches!(source.as_ref(), AppError::EmbeddingService(_)));
        }
        other => panic!("expected interrupted ingestion, got {other:?}"),
    }
    assert!(matches!(err.root(), AppError::EmbeddingService(_)));

    let stored = harness.stored().await;
    assert_eq!(stored.len(), 10);
    assert!(stored.iter().all(|r| index_suffix(&r.id) < 10));
    assert_eq!(harness.upsert_calls().await, 1);
    assert_eq!(harness.embedding.call_count().await, 2);
}

#[tokio::test]
async fn upsert_failure_on_second_batch_keeps_first_batch_only() {
    // 20 000 chars -> 25 chunks -> batches of 10, 10, 5
    let harness = Harness::with_index(
        MockExtractor::text(document_text(20_000)),
        MockEmbedding::new(),
        MockIndex::failing_on(2),
    );

    let err = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "large.pdf"))
        .await
        .expect_err("second upsert fails");

    match &err {
        AppError::Interrupted { committed, source } => {
            assert_eq!(*committed, 10);
            assert!(matches!(source.as_ref(), AppError::VectorStore(msg) if msg.contains("quota exceeded")));
        }
        other => panic!("expected interrupted ingestion, got {other:?}"),
    }
    assert!(!err.is_user_correctable());

    let stored = harness.stored().await;
    assert_eq!(stored.len(), 10);
    assert!(stored.iter().all(|r| index_suffix(&r.id) < 10));
    assert_eq!(harness.upsert_calls().await, 2);
    assert_eq!(harness.embedding.call_count().await, 2);
}

#[tokio::test]
async fn zero_batch_size_is_rejected_before_embedding() {
    let harness = Harness::with_tuning(
        MockExtractor::text(document_text(2_500)),
        MockEmbedding::new(),
        IngestionTuning {
            batch_size: 0,
            ..IngestionTuning::default()
        },
    );

    let err = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "handbook.pdf"))
        .await
        .expect_err("unusable tuning");

    assert!(matches!(err, AppError::Configuration(msg) if msg.contains("batch_size")));
    assert_eq!(harness.embedding.call_count().await, 0);
    assert_eq!(harness.upsert_calls().await, 0);
}

#[tokio::test]
async fn wrong_credential_touches_no_collaborator() {
    let harness = Harness::new(MockExtractor::text(document_text(2_500)), MockEmbedding::new());

    let err = harness
        .pipeline
        .ingest(request(Some("guess"), "handbook.pdf"))
        .await
        .expect_err("wrong password");

    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(harness.extractor_calls().await, 0);
    assert_eq!(harness.embedding.call_count().await, 0);
    assert_eq!(harness.upsert_calls().await, 0);
}

#[tokio::test]
async fn missing_credential_is_rejected_before_missing_file() {
    let harness = Harness::new(MockExtractor::text("text"), MockEmbedding::new());

    let err = harness
        .pipeline
        .ingest(IngestionRequest::default())
        .await
        .expect_err("no credential");

    assert!(matches!(err, AppError::Auth(_)));
}

#[tokio::test]
async fn missing_file_is_a_validation_error() {
    let harness = Harness::new(MockExtractor::text("text"), MockEmbedding::new());

    let err = harness
        .pipeline
        .ingest(IngestionRequest {
            credential: Some(PASSWORD.into()),
            upload: None,
        })
        .await
        .expect_err("no file");

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(harness.extractor_calls().await, 0);
}

#[tokio::test]
async fn whitespace_only_document_is_empty_and_never_embedded() {
    let harness = Harness::new(MockExtractor::text(" \n\t \n"), MockEmbedding::new());

    let err = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "scan.pdf"))
        .await
        .expect_err("empty document");

    assert!(matches!(err, AppError::EmptyDocument));
    assert_eq!(harness.extractor_calls().await, 1);
    assert_eq!(harness.embedding.call_count().await, 0);
    assert_eq!(harness.upsert_calls().await, 0);
}

#[tokio::test]
async fn extraction_failure_stops_before_embedding() {
    let harness = Harness::new(MockExtractor::unreadable(), MockEmbedding::new());

    let err = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "broken.pdf"))
        .await
        .expect_err("unreadable document");

    assert!(matches!(err, AppError::Extraction(_)));
    assert!(err.is_user_correctable());
    assert_eq!(harness.embedding.call_count().await, 0);
}

#[tokio::test]
async fn wrong_vector_dimension_aborts_before_upsert() {
    let harness = Harness::new(
        MockExtractor::text(document_text(500)),
        MockEmbedding::wrong_dimension(),
    );

    let err = harness
        .pipeline
        .ingest(request(Some(PASSWORD), "notes.pdf"))
        .await
        .expect_err("dimension mismatch");

    assert!(
        matches!(&err, AppError::Interrupted { committed: 0, source } if matches!(source.as_ref(), AppError::EmbeddingService(_)))
    );
    assert_eq!(harness.upsert_calls().await, 0);
}

#[tokio::test]
async fn reingesting_same_document_creates_new_ids() {
    let harness = Harness::new(MockExtractor::text(document_text(900)), MockEmbedding::new());

    harness
        .pipeline
        .ingest(request(Some(PASSWORD), "notes.pdf"))
        .await
        .expect("first ingestion");
    tokio::time::sleep(Duration::from_millis(5)).await;
    harness
        .pipeline
        .ingest(request(Some(PASSWORD), "notes.pdf"))
        .await
        .expect("second ingestion");

    let stored = harness.stored().await;
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0].id, stored[1].id);
    assert_eq!(stored[0].metadata.text, stored[1].metadata.text);
}
