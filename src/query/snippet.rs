//! Line text for the hits of a returned page
//!
//! Segments keep line offsets but not file content, so the text is read
//! back from the project's source tree. A file whose content no longer
//! hashes to the indexed document gets no snippets: its lines may have
//! moved since it was indexed.

use std::path::Path;

use tracing::debug;

use crate::document::content_hash;
use crate::models::{Document, LineSnippet};

/// Text of the first `max_lines` of `lines` in `document`
pub fn line_snippets(
    root: &Path,
    document: &Document,
    lines: &[u32],
    max_lines: usize,
    max_chars: usize,
) -> Vec<LineSnippet> {
    if max_lines == 0 || lines.is_empty() || document.metadata_only {
        return Vec::new();
    }
    let path = root.join(&document.path);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "source unreadable, no snippets");
            return Vec::new();
        }
    };
    if content_hash(&bytes) != document.content_hash {
        debug!(project = %document.project, path = %document.path, "source changed since indexing, no snippets");
        return Vec::new();
    }

    lines
        .iter()
        .take(max_lines)
        .filter_map(|&line| {
            let text = line_text(&bytes, &document.line_offsets, line)?;
            Some(LineSnippet {
                line,
                text: truncate(text, max_chars),
            })
        })
        .collect()
}

fn line_text<'b>(bytes: &'b [u8], offsets: &[u32], line: u32) -> Option<&'b str> {
    let index = (line as usize).checked_sub(1)?;
    let start = *offsets.get(index)? as usize;
    let end = offsets.get(index + 1).map_or(bytes.len(), |&next| next as usize);
    let text = std::str::from_utf8(bytes.get(start..end)?).ok()?;
    Some(text.trim_end_matches(['\n', '\r']))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
