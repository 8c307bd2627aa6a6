//! Open-document buffer tracking.
//!
//! Thread-safe map of URI to buffer contents with a monotonic per-URI
//! version. The version feeds the frontend's dirty check: any bump makes the
//! next compile re-parse that source, which is how placeholder injection
//! forces a recompile without a real edit.
//!
//! Closing a URI keeps its contents until a change or removal is observed —
//! the orchestrator may still read the buffer while tearing a scope down.

use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};
use tracing::debug;

#[derive(Debug, Clone)]
struct TrackedDocument {
    text: Arc<String>,
    version: i64,
    open: bool,
}

/// Thread-safe URI → contents map with version tracking.
#[derive(Debug, Default)]
pub struct FileContentsTracker {
    documents: DashMap<Url, TrackedDocument>,
}

impl FileContentsTracker {
    pub fn new() -> Self {
        FileContentsTracker::default()
    }

    pub fn open(&self, uri: Url, text: String) {
        let mut version = 1;
        if let Some(existing) = self.documents.get(&uri) {
            version = existing.version + 1;
        }
        self.documents.insert(
            uri,
            TrackedDocument {
                text: Arc::new(text),
                version,
                open: true,
            },
        );
    }

    /// Apply LSP content changes in order. Unknown URIs are ignored with a
    /// debug log; the client is ahead of us and a full sync will follow.
    pub fn change(&self, uri: &Url, changes: &[TextDocumentContentChangeEvent]) {
        let Some(mut entry) = self.documents.get_mut(uri) else {
            debug!("change for untracked document {uri}");
            return;
        };
        let mut text = entry.text.as_ref().clone();
        for change in changes {
            match change.range {
                None => text = change.text.clone(),
                Some(range) => {
                    let start = position_to_offset(&text, range.start);
                    let end = position_to_offset(&text, range.end).max(start);
                    text.replace_range(start..end, &change.text);
                }
            }
        }
        entry.text = Arc::new(text);
        entry.version += 1;
        entry.open = true;
    }

    /// Replace the whole buffer. Used by placeholder injection and restore;
    /// bumps the version like any real edit.
    pub fn set_contents(&self, uri: &Url, text: Arc<String>) {
        match self.documents.get_mut(uri) {
            Some(mut entry) => {
                entry.text = text;
                entry.version += 1;
            }
            None => {
                self.documents.insert(
                    uri.clone(),
                    TrackedDocument {
                        text,
                        version: 1,
                        open: false,
                    },
                );
            }
        }
    }

    /// Bump the version without touching contents, so the next compile
    /// treats the buffer as dirty.
    pub fn force_changed(&self, uri: &Url) {
        if let Some(mut entry) = self.documents.get_mut(uri) {
            entry.version += 1;
        }
    }

    /// Mark closed but keep the contents until a change or removal.
    pub fn close(&self, uri: &Url) {
        if let Some(mut entry) = self.documents.get_mut(uri) {
            entry.open = false;
        }
    }

    pub fn remove(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    pub fn contents(&self, uri: &Url) -> Option<Arc<String>> {
        self.documents.get(uri).map(|e| e.text.clone())
    }

    pub fn version(&self, uri: &Url) -> Option<i64> {
        self.documents.get(uri).map(|e| e.version)
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.documents.get(uri).map(|e| e.open).unwrap_or(false)
    }

    pub fn open_uris(&self) -> Vec<Url> {
        self.documents
            .iter()
            .filter(|e| e.open)
            .map(|e| e.key().clone())
            .collect()
    }
}

/// Byte offset of an LSP position. Columns are UTF-16 code units per the
/// protocol default. Positions past the end of a line or file clamp.
pub fn position_to_offset(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (line_no, line) in split_lines_inclusive(text) {
        if line_no == position.line {
            let content = line.trim_end_matches(['\n', '\r']);
            let mut utf16 = 0u32;
            for (byte, ch) in content.char_indices() {
                if utf16 >= position.character {
                    return offset + byte;
                }
                utf16 += ch.len_utf16() as u32;
            }
            return offset + content.len();
        }
        offset += line.len();
    }
    text.len()
}

/// Inverse of [`position_to_offset`]; byte offsets inside a multi-byte
/// character round down.
pub fn offset_to_position(text: &str, target: usize) -> Position {
    let mut offset = 0;
    let mut last_line = 0;
    for (line_no, line) in split_lines_inclusive(text) {
        last_line = line_no;
        if target < offset + line.len()
            || (target == offset + line.len() && !line.ends_with('\n'))
        {
            let within = &line[..target.saturating_sub(offset).min(line.len())];
            let character = within.chars().map(|c| c.len_utf16() as u32).sum();
            return Position::new(line_no, character);
        }
        offset += line.len();
    }
    Position::new(last_line + 1, 0)
}

/// The `line`-th line without its terminator, or `None` past the end.
pub fn line_at(text: &str, line: u32) -> Option<&str> {
    split_lines_inclusive(text)
        .find(|(n, _)| *n == line)
        .map(|(_, l)| l.trim_end_matches(['\n', '\r']))
}

fn split_lines_inclusive(text: &str) -> impl Iterator<Item = (u32, &str)> {
    let mut start = 0;
    let mut line_no = 0u32;
    std::iter::from_fn(move || {
        if start >= text.len() {
            return None;
        }
        let rest = &text[start..];
        let len = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        let item = (line_no, &rest[..len]);
        start += len;
        line_no += 1;
        Some(item)
    })
}
