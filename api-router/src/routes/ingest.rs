use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::utils::ingest_limits::validate_upload;
use ingestion_pipeline::{DocumentUpload, IngestionRequest};
use serde_json::json;
use tracing::info;

use crate::{api_auth::extract_api_key, api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct IngestParams {
    // The router's body limit bounds the field size.
    #[form_data(limit = "unlimited")]
    pub file: Option<FieldData<Bytes>>,
    pub password: Option<String>,
}

pub async fn ingest_document(
    State(state): State<ApiState>,
    headers: HeaderMap,
    TypedMultipart(input): TypedMultipart<IngestParams>,
) -> Result<impl IntoResponse, ApiError> {
    let credential = input
        .password
        .filter(|password| !password.is_empty())
        .or_else(|| extract_api_key(&headers));

    let upload = match input.file {
        Some(field) => {
            let source_name = field
                .metadata
                .file_name
                .unwrap_or_else(|| "upload.pdf".to_string());
            validate_upload(&state.config, &source_name, field.contents.len())?;
            Some(DocumentUpload {
                source_name,
                bytes: field.contents,
            })
        }
        None => None,
    };

    info!(
        has_credential = credential.is_some(),
        file_name = upload.as_ref().map(|u| u.source_name.as_str()),
        file_bytes = upload.as_ref().map(|u| u.bytes.len()),
        "Received ingestion request"
    );

    let report = state
        .ingestion
        .ingest(IngestionRequest { credential, upload })
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "success": true, "chunks": report.chunk_count })),
    ))
}
