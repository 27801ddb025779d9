//! Model token counting.
//!
//! Counts use the `cl100k_base` BPE when it can be loaded and fall back to a
//! whitespace split otherwise, so every budget derived from these numbers is
//! an estimate.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn bpe() -> Option<&'static CoreBPE> {
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!("cl100k_base unavailable, approximating tokens by whitespace: {}", e);
            None
        }
    })
    .as_ref()
}

/// Number of model tokens in `text`. Returns 0 for empty input.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match bpe() {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => whitespace_tokens(text),
    }
}

/// Whitespace-split approximation used when no BPE is available
pub fn whitespace_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(whitespace_tokens(""), 0);
    }

    #[test]
    fn test_simple_text_has_tokens() {
        assert!(count_tokens("hello world") > 0);
    }

    #[test]
    fn test_deterministic() {
        let text = "fn main() {\n    println!(\"hi\");\n}\n";
        assert_eq!(count_tokens(text), count_tokens(text));
    }

    #[test]
    fn test_whitespace_fallback_counts_words() {
        assert_eq!(whitespace_tokens("def add(a, b):\n    return a + b"), 7);
    }
}
