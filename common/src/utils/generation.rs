use std::{pin::Pin, sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::{
    error::AppError,
    storage::types::message::{ConversationTurn, MessageRole},
    utils::deadline::with_deadline,
};

const GENERATION_SERVICE: &str = "generation";

/// Forward-only sequence of text fragments from the language model. Dropping
/// it releases the upstream connection.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn stream(
        &self,
        system_prompt: &str,
        conversation: &[ConversationTurn],
    ) -> Result<TokenStream, AppError>;
}

pub struct OpenAIGenerationClient {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    timeout: Duration,
}

impl OpenAIGenerationClient {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }
}

pub fn create_chat_request(
    model: &str,
    system_prompt: &str,
    conversation: &[ConversationTurn],
) -> Result<CreateChatCompletionRequest, AppError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(conversation.len() + 1);
    messages.push(ChatCompletionRequestSystemMessage::from(system_prompt).into());

    for turn in conversation {
        let message = match turn.role {
            MessageRole::User => {
                ChatCompletionRequestUserMessage::from(turn.content.as_str()).into()
            }
            MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.as_str())
                .build()
                .map_err(|e| AppError::GenerationService(e.to_string()))?
                .into(),
        };
        messages.push(message);
    }

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(messages)
        .build()
        .map_err(|e| AppError::GenerationService(e.to_string()))
}

#[async_trait]
impl GenerationClient for OpenAIGenerationClient {
    async fn stream(
        &self,
        system_prompt: &str,
        conversation: &[ConversationTurn],
    ) -> Result<TokenStream, AppError> {
        let request = create_chat_request(&self.model, system_prompt, conversation)?;

        let client = Arc::clone(&self.client);
        let mut upstream = with_deadline(GENERATION_SERVICE, self.timeout, async move {
            client
                .chat()
                .create_stream(request)
                .await
                .map_err(|e| AppError::GenerationService(e.to_string()))
        })
        .await?;

        let timeout = self.timeout;
        let tokens = stream! {
            loop {
                let next = match tokio::time::timeout(timeout, upstream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        yield Err(AppError::Timeout { service: GENERATION_SERVICE, after: timeout });
                        break;
                    }
                };

                match next {
                    Some(Ok(response)) => {
                        let content = response
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone())
                            .unwrap_or_default();
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(AppError::GenerationService(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        };

        Ok(Box::pin(tokens))
    }
}
