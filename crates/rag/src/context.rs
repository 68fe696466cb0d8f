use folio_index::RetrievalResult;

/// Context handed to the model when retrieval found nothing, so the prompt
/// still says so explicitly.
pub const NO_CONTEXT: &str = "No relevant information found.";

pub fn format_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, result)| format!("[Source {}]:\n{}\n", i + 1, result.text))
        .collect::<Vec<_>>()
        .join("\n")
}
