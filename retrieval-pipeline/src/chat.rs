use std::{sync::Arc, time::Instant};

use async_stream::stream;
use common::{
    error::AppError,
    storage::types::message::{format_history, ConversationTurn, MessageRole},
    utils::generation::{GenerationClient, TokenStream},
};
use futures::StreamExt;
use tracing::{debug, info, instrument};

use crate::{answer_retrieval::system_prompt, RetrievalEngine};

/// Answers the latest user question from retrieved document context.
pub struct ChatOrchestrator {
    retrieval: RetrievalEngine,
    generation: Arc<dyn GenerationClient>,
}

impl ChatOrchestrator {
    pub fn new(retrieval: RetrievalEngine, generation: Arc<dyn GenerationClient>) -> Self {
        Self {
            retrieval,
            generation,
        }
    }

    /// Retrieves context for the last user turn and streams the model's answer.
    ///
    /// Failures before the first fragment are returned as `Err`. Once streaming has
    /// started, an upstream failure is yielded as the final `Err` item. Dropping the
    /// returned stream drops the upstream generation stream with it.
    #[instrument(skip_all, fields(turns = conversation.len()))]
    pub async fn answer(&self, conversation: &[ConversationTurn]) -> Result<TokenStream, AppError> {
        let query = latest_question(conversation)?;
        let config = self.retrieval.config();

        let retrieved = self.retrieval.retrieve(query, config.top_k).await?;
        let context = retrieved.context(config.max_context_chars);
        info!(
            matches = retrieved.len(),
            context_chars = context.text.chars().count(),
            context_truncated = context.truncated,
            grounded = !context.is_empty(),
            "chat context assembled"
        );
        debug!(history = %format_history(conversation), "chat conversation");

        let prompt = system_prompt(&context.text);
        let upstream = self.generation.stream(&prompt, conversation).await?;

        Ok(guard_stream(upstream))
    }
}

fn latest_question(conversation: &[ConversationTurn]) -> Result<&str, AppError> {
    let last = conversation
        .last()
        .ok_or_else(|| AppError::Validation("Conversation must not be empty".into()))?;

    if last.role != MessageRole::User {
        return Err(AppError::Validation(
            "The last message must come from the user".into(),
        ));
    }
    if last.content.trim().is_empty() {
        return Err(AppError::Validation("The question must not be empty".into()));
    }

    Ok(&last.content)
}

/// Logs when the consumer goes away before the answer is complete.
struct CompletionGuard {
    started: Instant,
    fragments: usize,
    finished: bool,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if self.finished {
            debug!(fragments = self.fragments, elapsed_ms, "chat stream completed");
        } else {
            debug!(
                fragments = self.fragments,
                elapsed_ms,
                "chat stream dropped before completion; upstream released"
            );
        }
    }
}

/// Forwards fragments until the first error, which ends the stream.
fn guard_stream(mut upstream: TokenStream) -> TokenStream {
    let mut guard = CompletionGuard {
        started: Instant::now(),
        fragments: 0,
        finished: false,
    };

    Box::pin(stream! {
        while let Some(item) = upstream.next().await {
            let failed = item.is_err();
            if !failed {
                guard.fragments += 1;
            }
            yield item;
            if failed {
                break;
            }
        }
        guard.finished = true;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        answer_retrieval::{NO_CONTEXT_MARKER, REFUSAL_PHRASE},
        tests::{index_with, MemoryIndex},
        RetrievalConfig,
    };
    use async_trait::async_trait;
    use common::utils::embedding::EmbeddingProvider;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Streams back the system prompt it received, word by word.
    #[derive(Default)]
    struct EchoGeneration {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationClient for EchoGeneration {
        async fn stream(
            &self,
            system_prompt: &str,
            _conversation: &[ConversationTurn],
        ) -> Result<TokenStream, AppError> {
            self.prompts.lock().await.push(system_prompt.to_string());
            let fragments: Vec<Result<String, AppError>> = system_prompt
                .split_inclusive(' ')
                .map(|word| Ok(word.to_string()))
                .collect();
            Ok(Box::pin(stream::iter(fragments)))
        }
    }

    /// Emits one fragment, then fails.
    struct FailingGeneration;

    #[async_trait]
    impl GenerationClient for FailingGeneration {
        async fn stream(
            &self,
            _system_prompt: &str,
            _conversation: &[ConversationTurn],
        ) -> Result<TokenStream, AppError> {
            Ok(Box::pin(stream::iter(vec![
                Ok("Partial".to_string()),
                Err(AppError::GenerationService("connection reset".into())),
                Ok("never delivered".to_string()),
            ])))
        }
    }

    fn orchestrator(
        index: Arc<MemoryIndex>,
        generation: Arc<dyn GenerationClient>,
    ) -> ChatOrchestrator {
        let retrieval = RetrievalEngine::new(
            Arc::new(EmbeddingProvider::new_hashed(64)),
            index,
            RetrievalConfig::default(),
        );
        ChatOrchestrator::new(retrieval, generation)
    }

    async fn collect(stream: TokenStream) -> Vec<Result<String, AppError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn empty_index_answer_carries_refusal_policy() {
        let generation = Arc::new(EchoGeneration::default());
        let chat = orchestrator(
            Arc::new(MemoryIndex::default()),
            Arc::clone(&generation) as Arc<dyn GenerationClient>,
        );

        let stream = chat
            .answer(&[ConversationTurn::user("What is the refund policy?")])
            .await
            .expect("answer");
        let answer: String = collect(stream)
            .await
            .into_iter()
            .map(|item| item.expect("fragment"))
            .collect();

        assert!(answer.contains(REFUSAL_PHRASE));
        assert!(answer.contains(NO_CONTEXT_MARKER));
        assert_eq!(generation.prompts.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn retrieved_text_reaches_the_system_prompt() {
        let embedding = EmbeddingProvider::new_hashed(64);
        let index = index_with(
            &embedding,
            &["refunds are issued within fourteen days of purchase"],
        )
        .await;
        let generation = Arc::new(EchoGeneration::default());
        let chat = orchestrator(index, Arc::clone(&generation) as Arc<dyn GenerationClient>);

        let stream = chat
            .answer(&[
                ConversationTurn::user("hello"),
                ConversationTurn::assistant("Hi, ask me about the document."),
                ConversationTurn::user("how fast are refunds issued"),
            ])
            .await
            .expect("answer");
        drop(collect(stream).await);

        let prompts = generation.prompts.lock().await;
        assert!(prompts[0].contains("refunds are issued within fourteen days of purchase"));
        assert!(!prompts[0].contains(NO_CONTEXT_MARKER));
    }

    #[tokio::test]
    async fn upstream_failure_ends_stream_with_error() {
        let chat = orchestrator(Arc::new(MemoryIndex::default()), Arc::new(FailingGeneration));

        let items = collect(
            chat.answer(&[ConversationTurn::user("question")])
                .await
                .expect("answer"),
        )
        .await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(fragment) if fragment == "Partial"));
        assert!(matches!(&items[1], Err(AppError::GenerationService(_))));
    }

    #[tokio::test]
    async fn conversation_must_end_with_a_user_question() {
        let chat = orchestrator(
            Arc::new(MemoryIndex::default()),
            Arc::new(EchoGeneration::default()),
        );

        for conversation in [
            vec![],
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("hello"),
            ],
            vec![ConversationTurn::user("   ")],
        ] {
            let err = match chat.answer(&conversation).await {
                Ok(_) => panic!("conversation {conversation:?} should be rejected"),
                Err(err) => err,
            };
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    /// Marks the upstream as released when the generation stream is dropped.
    struct ReleaseFlag(Arc<AtomicBool>);

    impl Drop for ReleaseFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Never finishes on its own and counts how many fragments were pulled.
    #[derive(Default)]
    struct EndlessGeneration {
        pulls: Arc<AtomicUsize>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl GenerationClient for EndlessGeneration {
        async fn stream(
            &self,
            _system_prompt: &str,
            _conversation: &[ConversationTurn],
        ) -> Result<TokenStream, AppError> {
            let pulls = Arc::clone(&self.pulls);
            let flag = ReleaseFlag(Arc::clone(&self.released));
            Ok(Box::pin(stream::repeat_with(move || {
                let _owner = &flag;
                let n = pulls.fetch_add(1, Ordering::SeqCst);
                Ok(format!("token{n} "))
            })))
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_upstream() {
        let generation = Arc::new(EndlessGeneration::default());
        let chat = orchestrator(
            Arc::new(MemoryIndex::default()),
            Arc::clone(&generation) as Arc<dyn GenerationClient>,
        );

        let mut stream = chat
            .answer(&[ConversationTurn::user("question")])
            .await
            .expect("answer");
        for expected in ["token0 ", "token1 ", "token2 "] {
            assert!(matches!(stream.next().await, Some(Ok(fragment)) if fragment == expected));
        }
        assert!(!generation.released.load(Ordering::SeqCst));

        drop(stream);

        assert!(generation.released.load(Ordering::SeqCst));
        let pulled = generation.pulls.load(Ordering::SeqCst);
        assert!(pulled <= 4, "upstream pulled {pulled} fragments for 3 delivered");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(generation.pulls.load(Ordering::SeqCst), pulled);
    }
}
