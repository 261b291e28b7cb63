use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::storage::types::message::ConversationTurn;
use futures::TryStreamExt;
use serde::Deserialize;
use tracing::{error, info};

use crate::{api_state::ApiState, error::ApiError};

/// Accepts either `{"messages": [...]}` or a bare array of turns.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatPayload {
    Wrapped { messages: Vec<ConversationTurn> },
    Bare(Vec<ConversationTurn>),
}

impl ChatPayload {
    pub fn into_turns(self) -> Vec<ConversationTurn> {
        match self {
            Self::Wrapped { messages } | Self::Bare(messages) => messages,
        }
    }
}

/// Streams the answer as plain UTF-8 text. A failure after the first fragment aborts
/// the response body.
pub async fn chat(
    State(state): State<ApiState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Response, ApiError> {
    let conversation = payload.into_turns();
    info!(turns = conversation.len(), "Received chat request");

    let fragments = state.chat.answer(&conversation).await?;
    let body = Body::from_stream(fragments.inspect_err(|err| {
        error!(error = %err, "Chat stream failed after the response started");
    }));

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}
