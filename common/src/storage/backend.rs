use std::{sync::Arc, time::Duration};

use tracing::info;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        pinecone::PineconeIndex,
        pinecone_control::{PineconeControlPlane, ServerlessIndex},
        surreal_index::SurrealVectorIndex,
        vector_index::{IndexProfile, VectorIndex},
    },
    utils::{
        config::{AppConfig, PineconeSettings, VectorStoreKind},
        embedding::EmbeddingClient,
    },
};

/// What to do when the configured index does not exist yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexSetup {
    /// Use the existing index; a missing one is a configuration error.
    Connect,
    /// Create a missing index before connecting.
    Provision,
}

/// Connects the vector store selected in the configuration.
pub async fn open_vector_index(
    config: &AppConfig,
    setup: IndexSetup,
) -> Result<Arc<dyn VectorIndex>, AppError> {
    let timeout = config.request_timeout();

    let index: Arc<dyn VectorIndex> = match config.vector_store {
        VectorStoreKind::Pinecone => {
            let settings = config.pinecone_settings()?;
            let host = pinecone_host(
                &settings,
                config.embedding_dimensions as usize,
                setup,
                timeout,
            )
            .await?;
            info!(
                index = settings.index_name,
                host = %host,
                namespace = settings.namespace.unwrap_or_default(),
                "using pinecone vector store"
            );
            Arc::new(PineconeIndex::new(&settings, &host, timeout)?)
        }
        VectorStoreKind::SurrealDb => {
            let settings = config.surreal_settings()?;
            let db = SurrealDbClient::from_settings(&settings).await?;
            let index = SurrealVectorIndex::new(
                Arc::new(db),
                config.embedding_dimensions as usize,
                timeout,
            );
            index.ensure_schema().await?;
            info!(address = settings.address, "using surrealdb vector store");
            Arc::new(index)
        }
    };

    Ok(index)
}

/// A configured host is used as is; otherwise the control plane resolves the index by
/// name, creating it first under `IndexSetup::Provision`.
async fn pinecone_host(
    settings: &PineconeSettings<'_>,
    dimension: usize,
    setup: IndexSetup,
    timeout: Duration,
) -> Result<String, AppError> {
    if let Some(host) = settings.index_host {
        return Ok(host.to_string());
    }

    let control = PineconeControlPlane::new(settings.api_key, settings.control_url, timeout)?;
    match setup {
        IndexSetup::Connect => control.resolve_host(settings.index_name).await,
        IndexSetup::Provision => {
            control
                .ensure_index(&ServerlessIndex {
                    name: settings.index_name,
                    dimension,
                    cloud: settings.cloud,
                    region: settings.region,
                })
                .await
        }
    }
}

/// Fails startup when the index was populated by a different embedding profile.
pub async fn ensure_index_profile(
    index: &dyn VectorIndex,
    embedding: &dyn EmbeddingClient,
) -> Result<IndexProfile, AppError> {
    let profile = IndexProfile {
        embedding_model: embedding.model_code(),
        dimension: embedding.dimension(),
    };

    index.ensure_profile(&profile).await?;
    info!(
        backend = index.backend_label(),
        model = %profile.embedding_model,
        dimension = profile.dimension,
        "index profile verified"
    );

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::vector_index::IndexDescription, utils::embedding::EmbeddingProvider};
    use async_trait::async_trait;

    struct FixedIndex {
        dimension: Option<usize>,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn upsert(
            &self,
            _records: Vec<crate::storage::vector_index::IndexedRecord>,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _top_k: usize,
        ) -> Result<Vec<crate::storage::vector_index::ScoredRecord>, AppError> {
            Ok(Vec::new())
        }

        async fn describe(&self) -> Result<IndexDescription, AppError> {
            Ok(IndexDescription {
                dimension: self.dimension,
                record_count: None,
            })
        }

        fn backend_label(&self) -> &'static str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn matching_dimension_yields_profile() {
        let embedding = EmbeddingProvider::new_hashed(16);
        let index = FixedIndex {
            dimension: Some(16),
        };

        let profile = ensure_index_profile(&index, &embedding)
            .await
            .expect("profile");
        assert_eq!(profile.dimension, 16);
        assert_eq!(profile.embedding_model, "hashed-16");
    }

    #[tokio::test]
    async fn configured_pinecone_host_skips_the_control_plane() {
        let config = AppConfig {
            pinecone_api_key: Some("pc-key".into()),
            pinecone_index_host: Some("doc-chat-abc.svc.pinecone.io".into()),
            // Nothing listens here; any control-plane call would fail.
            pinecone_control_url: "http://127.0.0.1:9".into(),
            ..AppConfig::default()
        };

        for setup in [IndexSetup::Connect, IndexSetup::Provision] {
            let index = open_vector_index(&config, setup).await.expect("index");
            assert_eq!(index.backend_label(), "pinecone");
        }
    }

    #[tokio::test]
    async fn unreachable_control_plane_fails_without_a_host() {
        let config = AppConfig {
            pinecone_api_key: Some("pc-key".into()),
            pinecone_control_url: "http://127.0.0.1:9".into(),
            request_timeout_secs: 2,
            ..AppConfig::default()
        };

        let err = match open_vector_index(&config, IndexSetup::Provision).await {
            Ok(_) => panic!("no host can be resolved"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            AppError::VectorStore(_) | AppError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn dimension_mismatch_blocks_startup() {
        let embedding = EmbeddingProvider::new_hashed(16);
        let index = FixedIndex {
            dimension: Some(1536),
        };

        let err = ensure_index_profile(&index, &embedding)
            .await
            .expect_err("mismatch");
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
