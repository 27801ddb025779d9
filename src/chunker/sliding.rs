use super::{Chunk, ChunkType};
use crate::tokenizer::count_tokens;

/// Line-granular sliding window over `lines`.
///
/// Windows grow until the next line would push them past `max_tokens`; a
/// single line larger than the budget becomes a window of its own. The next
/// window starts `overlap_tokens` worth of lines before the previous end,
/// converted with the window's average tokens per line, and always at least
/// one line after the previous start. That conversion is approximate: files
/// with very uneven line lengths can end up with an effective overlap far
/// from the requested one.
///
/// Every line lands in at least one window. A window holding only blank
/// lines keeps growing into the next non-blank line, and blank lines at the
/// end of the file join the last window.
pub(crate) fn sliding_chunks(
    file_path: &str,
    file_name: &str,
    lines: &[&str],
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < lines.len() {
        let mut end = start;
        let mut window_tokens = 0;
        while end < lines.len() && window_tokens < max_tokens {
            let line_tokens = count_tokens(lines[end]);
            if window_tokens + line_tokens > max_tokens && end > start {
                break;
            }
            window_tokens += line_tokens;
            end += 1;
        }
        if end == start {
            end = start + 1;
        }
        while end < lines.len() && is_blank(&lines[start..end]) {
            end += 1;
        }

        let content = lines[start..end].join("\n");
        if is_blank(&lines[start..end]) {
            if let Some(last) = chunks.last_mut() {
                fold_into(last, lines, end);
                break;
            }
        }

        let index = chunks.len();
        chunks.push(Chunk::new(
            content.clone(),
            file_path,
            ChunkType::Sliding,
            format!("{} chunk {}", file_name, index),
            start + 1,
            end,
        ));

        if end >= lines.len() {
            break;
        }

        let overlap = overlap_lines(&content, end - start, overlap_tokens);
        start = (start + 1).max(end.saturating_sub(overlap));
    }

    tracing::debug!("{}: {} sliding windows", file_path, chunks.len());
    chunks
}

fn is_blank(lines: &[&str]) -> bool {
    lines.iter().all(|line| line.trim().is_empty())
}

/// Extend `chunk` through line `end` (1-based, inclusive)
fn fold_into(chunk: &mut Chunk, lines: &[&str], end: usize) {
    chunk.line_end = end;
    chunk.content = lines[chunk.line_start - 1..end].join("\n");
}

/// Token overlap expressed in lines of the current window
fn overlap_lines(window: &str, window_lines: usize, overlap_tokens: usize) -> usize {
    let tokens_per_line = (count_tokens(window) / window_lines.max(1)).max(1);
    overlap_tokens / tokens_per_line
}
