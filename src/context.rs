//! Greedy, token-bounded packing of retrieval results into one prompt block

use crate::error::{Error, Result};
use crate::retriever::RetrievalResult;
use crate::tokenizer::count_tokens;
use std::fmt::Write;

/// Packed context plus bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    /// Token count of `text`
    pub tokens: usize,
    /// Number of leading results included
    pub included: usize,
}

/// Packs results in order until the next block would push the joined text
/// past `max_tokens`. Everything from that block on is dropped, so the
/// output is always a prefix of the unbounded rendering.
pub fn assemble(
    results: &[RetrievalResult],
    max_tokens: usize,
    include_metadata: bool,
) -> Result<AssembledContext> {
    if max_tokens == 0 {
        return Err(Error::invalid_budget("max_tokens"));
    }

    let mut assembled = AssembledContext::default();
    for (i, result) in results.iter().enumerate() {
        let block = format_block(i + 1, result, include_metadata);
        let candidate = if assembled.text.is_empty() {
            block
        } else {
            format!("{}\n{}", assembled.text, block)
        };

        let tokens = count_tokens(&candidate);
        if tokens > max_tokens {
            tracing::debug!(
                "Context budget reached after {} of {} results",
                i,
                results.len()
            );
            break;
        }
        assembled.text = candidate;
        assembled.tokens = tokens;
        assembled.included += 1;
    }

    Ok(assembled)
}

/// Text-only form of [`assemble`]
pub fn build_context(
    results: &[RetrievalResult],
    max_tokens: usize,
    include_metadata: bool,
) -> Result<String> {
    assemble(results, max_tokens, include_metadata).map(|assembled| assembled.text)
}

fn format_block(index: usize, result: &RetrievalResult, include_metadata: bool) -> String {
    let file_path = result.file_path().unwrap_or("unknown");
    let mut block = String::new();

    if include_metadata {
        let _ = write!(
            block,
            "### [{}] {} (lines {}, type: {}",
            index,
            file_path,
            result.line_span(),
            result.chunk_type().unwrap_or("code"),
        );
        if let Some(name) = result.name() {
            let _ = write!(block, ", name: {}", name);
        }
        let _ = writeln!(block, ", similarity: {:.2})", result.similarity);
    } else {
        let _ = writeln!(block, "### [{}] {}", index, file_path);
    }

    let _ = write!(block, "```\n{}\n```\n", result.content);
    block
}
