//! Page-aligned chunking of document text.
//!
//! The cleaning model sees one chunk per request, so a chunk plus the
//! instructions has to fit the model's input window. Chunk boundaries always
//! fall on page boundaries: a page is never split, even when it alone
//! exceeds the limit.

use crate::output::TextChunk;
use once_cell::sync::Lazy;
use regex::Regex;

/// Separator placed between pages inside a chunk.
pub const PAGE_SEPARATOR: &str = "\n\n";

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"--- Page \d+ ---").unwrap());

/// Render the marker that precedes page `n` in joined document text.
pub fn page_marker(n: usize) -> String {
    format!("--- Page {n} ---")
}

/// Join sanitised pages into one document, each preceded by its marker.
pub fn join_pages<'a>(pages: impl IntoIterator<Item = (usize, &'a str)>) -> String {
    pages
        .into_iter()
        .map(|(n, text)| format!("{}\n{}", page_marker(n), text))
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Split `text` into chunks of at most `max_chunk_size` characters.
///
/// Pages are found via [`page_marker`] lines; text without markers is one
/// page. Empty pages are skipped. Sizes are measured in characters and
/// include the separators between pages.
pub fn split(text: &str, max_chunk_size: usize) -> Vec<TextChunk> {
    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let sep_len = PAGE_SEPARATOR.chars().count();

    for page in RE_PAGE_MARKER.split(text).map(str::trim).filter(|p| !p.is_empty()) {
        let page_len = page.chars().count();
        if current.is_empty() {
            current.push_str(page);
            current_len = page_len;
            continue;
        }
        if current_len + sep_len + page_len > max_chunk_size {
            seal(&mut chunks, &mut current);
            current.push_str(page);
            current_len = page_len;
        } else {
            current.push_str(PAGE_SEPARATOR);
            current.push_str(page);
            current_len += sep_len + page_len;
        }
    }
    if !current.is_empty() {
        seal(&mut chunks, &mut current);
    }
    chunks
}

fn seal(chunks: &mut Vec<TextChunk>, current: &mut String) {
    let index = chunks.len();
    chunks.push(TextChunk {
        index,
        text: std::mem::take(current),
    });
}
