// Shared prompt fragments.
// Each module that calls the LLM keeps its own prompts.rs alongside it;
// this file only holds the pieces they have in common.

/// Appended to every prompt that expects a JSON object back.
pub const JSON_ONLY_INSTRUCTION: &str = "\
Restituisci SOLO un JSON valido: niente markdown, niente spiegazioni, \
nessun testo prima o dopo l'oggetto.";

/// Grounding rule for extraction prompts.
pub const NO_INVENTION_INSTRUCTION: &str = "\
Estrai SOLO informazioni presenti nel testo. \
Se un campo non è presente usa stringa vuota \"\" o array vuoto [].";

/// Truncates `text` to at most `max_chars` characters for prompt embedding.
pub fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
