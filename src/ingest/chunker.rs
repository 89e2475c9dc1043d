use std::collections::{BTreeMap, VecDeque};

use tracing::warn;

use super::loader::LoadedElement;
use crate::core::config::settings::IngestSettings;

/// A chunk of row text ready for embedding, with its full metadata stamp
/// (source file, dense chunk index, start offset, row provenance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Split points tried in order, coarsest first. The empty separator is the
/// terminal fallback: split between every character.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", ", ", " ", ""];

/// Recursive character splitter. Lengths count characters, not bytes, so
/// multi-byte text never splits inside a code point.
///
/// Each element is split on the coarsest separator present, pieces are
/// merged back into windows of at most `chunk_size` characters with
/// `chunk_overlap` characters carried between neighboring windows, and the
/// joined windows are trimmed. Pieces still longer than `chunk_size` recurse
/// onto the finer separators.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    max_chunk_chars: usize,
}

impl Chunker {
    pub fn new(settings: &IngestSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            max_chunk_chars: settings.max_chunk_chars,
        }
    }

    /// Splits every element and stamps the surviving chunks with `source`,
    /// a dense `chunk_index` and the chunk's `start_index` within its
    /// element. Blank chunks are dropped and do not consume an index;
    /// oversized chunks are cut at `max_chunk_chars`.
    pub fn chunk_elements(&self, elements: &[LoadedElement], source: &str) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut dropped = 0usize;
        let mut truncated = 0usize;

        for element in elements {
            for (piece, start) in self.split_with_offsets(&element.text) {
                if piece.trim().is_empty() {
                    dropped += 1;
                    continue;
                }

                let (text, was_cut) = truncate_chars(piece, self.max_chunk_chars);
                if was_cut {
                    truncated += 1;
                }

                let mut metadata = element.metadata.clone();
                metadata.insert("source".to_string(), source.to_string());
                metadata.insert("start_index".to_string(), start.to_string());
                metadata.insert("chunk_index".to_string(), chunks.len().to_string());
                chunks.push(Chunk { text, metadata });
            }
        }

        if dropped > 0 {
            warn!("Dropped {} blank chunks from '{}'", dropped, source);
        }
        if truncated > 0 {
            warn!(
                "Truncated {} chunks from '{}' to {} chars",
                truncated, source, self.max_chunk_chars
            );
        }
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    /// Like `split_text`, but each chunk comes with its character offset in
    /// `text`. Offsets are found by scanning forward from the previous
    /// chunk's start, so they increase monotonically even when chunks repeat.
    fn split_with_offsets(&self, text: &str) -> Vec<(String, usize)> {
        let pieces = self.split_text(text);
        let mut results = Vec::with_capacity(pieces.len());
        let mut cursor = 0usize;

        for piece in pieces {
            let start_byte = text[cursor..]
                .find(&piece)
                .map(|pos| cursor + pos)
                .or_else(|| text.find(&piece))
                .unwrap_or(cursor);
            let start_char = text[..start_byte].chars().count();

            let advance = piece.chars().next().map(char::len_utf8).unwrap_or(1);
            cursor = start_byte + advance;
            results.push((piece, start_char));
        }
        results
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        let mut separator = *separators.last().unwrap_or(&"");
        let mut remaining: &[&str] = &[];
        for (index, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() || text.contains(candidate) {
                separator = candidate;
                remaining = &separators[index + 1..];
                break;
            }
        }

        let splits = split_with(text, separator);
        let mut good: Vec<String> = Vec::new();
        for split in splits {
            if char_len(&split) < self.chunk_size {
                good.push(split);
            } else {
                if !good.is_empty() {
                    final_chunks.extend(self.merge_splits(&good, separator));
                    good.clear();
                }
                if remaining.is_empty() {
                    final_chunks.push(split);
                } else {
                    final_chunks.extend(self.split_recursive(&split, remaining));
                }
            }
        }
        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good, separator));
        }
        final_chunks
    }

    /// Greedily packs splits into windows of at most `chunk_size` chars.
    /// After a window closes, leading splits are popped until the carried
    /// total fits inside `chunk_overlap`, which is what makes neighboring
    /// windows share their boundary text.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&String> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let split_len = char_len(split);
            let sep_cost = if current.is_empty() { 0 } else { separator_len };

            if total + split_len + sep_cost > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Built a chunk of {} chars, longer than the requested {}",
                        total, self.chunk_size
                    );
                }
                if !current.is_empty() {
                    if let Some(doc) = join_splits(&current, separator) {
                        docs.push(doc);
                    }
                    loop {
                        let sep_cost_now = if current.is_empty() { 0 } else { separator_len };
                        let over_overlap = total > self.chunk_overlap;
                        let still_too_big =
                            total + split_len + sep_cost_now > self.chunk_size && total > 0;
                        if !(over_overlap || still_too_big) {
                            break;
                        }
                        let Some(front) = current.front() else {
                            break;
                        };
                        let tail_sep = if current.len() > 1 { separator_len } else { 0 };
                        total -= char_len(front) + tail_sep;
                        current.pop_front();
                    }
                }
            }

            current.push_back(split);
            total += split_len;
            if current.len() > 1 {
                total += separator_len;
            }
        }

        if let Some(doc) = join_splits(&current, separator) {
            docs.push(doc);
        }
        docs
    }
}

fn split_with(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect()
    }
}

fn join_splits(parts: &VecDeque<&String>, separator: &str) -> Option<String> {
    if parts.is_empty() {
        return None;
    }
    let joined = parts
        .iter()
        .map(|part| part.as_str())
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    if char_len(&text) <= max_chars {
        return (text, false);
    }
    (text.chars().take(max_chars).collect(), true)
}
