use common::storage::vector_index::ScoredRecord;
use tracing::warn;

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledContext {
    pub text: String,
    /// Records that contributed text, whole or truncated.
    pub records_used: usize,
    pub truncated: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Joins record texts in the given order with [`CONTEXT_SEPARATOR`], keeping the total at
/// most `max_chars` chars. Records go in whole until one does not fit; that one is cut to
/// the remaining budget and assembly stops. Records with blank text are skipped.
pub fn assemble_context(records: &[ScoredRecord], max_chars: usize) -> AssembledContext {
    let separator_chars = CONTEXT_SEPARATOR.chars().count();
    let mut context = AssembledContext::default();
    let mut used = 0usize;

    for record in records {
        let text = record.metadata.text.trim();
        if text.is_empty() {
            continue;
        }

        let separator = if context.records_used == 0 {
            0
        } else {
            separator_chars
        };
        let remaining = max_chars.saturating_sub(used + separator);
        if remaining == 0 {
            context.truncated = true;
            break;
        }

        if context.records_used > 0 {
            context.text.push_str(CONTEXT_SEPARATOR);
        }

        let text_chars = text.chars().count();
        context.records_used += 1;
        if text_chars <= remaining {
            context.text.push_str(text);
            used += separator + text_chars;
        } else {
            context.text.extend(text.chars().take(remaining));
            context.truncated = true;
            break;
        }
    }

    if context.truncated {
        warn!(
            max_chars,
            records_used = context.records_used,
            records_available = records.len(),
            "retrieved context truncated"
        );
    }

    context
}
