//! Process-wide tokenizer service.
//!
//! Token counts matter in several places (conversation pruning, chunk
//! sizing, summary prompts), and `CoreBPE::new` is not free, so the
//! `cl100k_base` encoder is built once behind a lazily-initialised static
//! and shared everywhere.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

static ENCODER: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary is bundled"));

/// Count tokens the same way the rest of the system sizes chunks, prunes
/// conversations, and budgets prompts.
pub fn count_tokens(text: &str) -> u32 {
    ENCODER.encode_with_special_tokens(text).len() as u32
}

/// Encode to token ids, needed when a caller must truncate to an exact
/// token budget (the chunker's hard-limit splitter).
pub fn encode(text: &str) -> Vec<u32> {
    ENCODER.encode_with_special_tokens(text)
}

/// Decode a slice of token ids back to text. Used when the chunker cuts a
/// line mid-token-budget and needs the exact prefix string back.
pub fn decode(tokens: &[u32]) -> String {
    ENCODER.decode(tokens.to_vec()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_stable_and_positive() {
        let n = count_tokens("retrieval augmented generation");
        assert!(n > 0);
        assert_eq!(n, count_tokens("retrieval augmented generation"));
    }

    #[test]
    fn encode_decode_round_trips() {
        let text = "chunking markdown documents";
        let ids = encode(text);
        assert_eq!(decode(&ids), text);
    }

    #[test]
    fn empty_string_has_zero_tokens() {
        assert_eq!(count_tokens(""), 0);
    }
}
