/// Phrase the model must use when the context does not contain the answer.
pub const REFUSAL_PHRASE: &str = "I don't know based on this document.";

/// Stands in for the context when retrieval found nothing, so the model is told explicitly
/// that it has no grounding.
pub const NO_CONTEXT_MARKER: &str = "No relevant context was found in the uploaded documents.";

pub fn system_prompt(context: &str) -> String {
    let context = if context.trim().is_empty() {
        NO_CONTEXT_MARKER
    } else {
        context
    };

    format!(
        "You are a helpful assistant. Use the specific Context below to answer the user.\n\
         If the answer is not in the Context, say \"{REFUSAL_PHRASE}\"\n\
         \n\
         Context:\n\
         {context}"
    )
}
