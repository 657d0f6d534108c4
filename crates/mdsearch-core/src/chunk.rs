//! Heading-aware markdown chunker.
//!
//! Splits a markdown document into [`Chunk`]s that never exceed a configured
//! character budget. Sections are delimited by ATX headings (`#` through
//! `######`); each section is packed paragraph by paragraph, and consecutive
//! chunks of one section share a short overlap so that context survives the
//! cut.
//!
//! # Algorithm
//!
//! 1. Scan line by line. A heading line closes the current section and
//!    opens a new one titled with the heading text. Content before the first
//!    heading forms an untitled section. Lines inside fenced code blocks are
//!    never headings.
//! 2. A closed section whose trimmed body is shorter than [`MIN_CHUNK_SIZE`]
//!    is dropped. Otherwise it is size-split.
//! 3. A section of at most `max_size` characters becomes one chunk. Larger
//!    sections are split on blank lines, oversized paragraphs are hard-split
//!    at the last newline or space, and paragraphs are packed greedily.
//!    Each new buffer starts with the tail of the previous chunk.
//! 4. If nothing was produced but the document has enough text, the whole
//!    document is size-split as one untitled section.
//!
//! Sizes are counted in characters, never bytes, and no slice ever splits a
//! code point.
//!
//! # Example
//!
//! ```rust
//! use mdsearch_core::chunk::{chunk_markdown, ChunkOptions};
//!
//! let text = "# Guide\n\n## Overview\n\nShort overview text.\n";
//! let chunks = chunk_markdown(text, ChunkOptions::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].section_title, "Overview");
//! assert_eq!(chunks[0].text, "Short overview text.");
//! ```

use crate::models::Chunk;

/// Sections and chunks shorter than this many characters are discarded.
pub const MIN_CHUNK_SIZE: usize = 20;

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_OVERLAP_SIZE: usize = 150;

/// Separator placed between packed paragraphs.
const PARAGRAPH_BREAK: &str = "\n\n";
const BREAK_LEN: usize = 2;

/// Size limits for [`chunk_markdown`], in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_size: usize,
    pub overlap_size: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
        }
    }
}

impl ChunkOptions {
    pub fn new(max_size: usize, overlap_size: usize) -> Self {
        Self {
            max_size,
            overlap_size,
        }
    }

    fn normalized(self) -> Self {
        Self {
            max_size: if self.max_size == 0 {
                DEFAULT_MAX_CHUNK_SIZE
            } else {
                self.max_size
            },
            overlap_size: self.overlap_size,
        }
    }
}

/// Split markdown `text` into ordered chunks.
///
/// The result is deterministic. Indices run `0..n` without gaps, every chunk
/// holds at least [`MIN_CHUNK_SIZE`] and at most `options.max_size`
/// characters, and offsets are byte positions into `text`.
pub fn chunk_markdown(text: &str, options: ChunkOptions) -> Vec<Chunk> {
    let options = options.normalized();
    let mut chunks = Vec::new();

    let mut section = Section::new(String::new(), 0);
    let mut offset = 0;
    let mut in_fence = false;

    for line in text.split_inclusive('\n') {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        match heading_title(line).filter(|_| !in_fence) {
            Some(title) => {
                section.flush(options, &mut chunks);
                section = Section::new(title.to_string(), offset + line.len());
            }
            None => section.body.push_str(line),
        }
        offset += line.len();
    }
    section.flush(options, &mut chunks);

    if chunks.is_empty() && char_len(text.trim()) >= MIN_CHUNK_SIZE {
        split_section(text, "", 0, options, &mut chunks);
    }

    chunks
}

/// Text accumulated under one heading.
struct Section {
    title: String,
    /// Byte offset of the first body line in the source.
    start: usize,
    body: String,
}

impl Section {
    fn new(title: String, start: usize) -> Self {
        Self {
            title,
            start,
            body: String::new(),
        }
    }

    fn flush(&self, options: ChunkOptions, chunks: &mut Vec<Chunk>) {
        if char_len(self.body.trim()) < MIN_CHUNK_SIZE {
            return;
        }
        split_section(&self.body, &self.title, self.start, options, chunks);
    }
}

/// Size-split one section body and append the resulting chunks.
fn split_section(
    body: &str,
    title: &str,
    base_offset: usize,
    options: ChunkOptions,
    chunks: &mut Vec<Chunk>,
) {
    let lead = body.len() - body.trim_start().len();
    let text = body.trim();
    let base_offset = base_offset + lead;

    if char_len(text) <= options.max_size {
        push_chunk(chunks, text, title, base_offset, base_offset + text.len());
        return;
    }

    let mut buffer = String::new();
    let mut buffer_len = 0;
    // False until the first piece is buffered.
    let mut has_body = false;
    let mut chunk_start = base_offset;

    for (para_offset, para) in paragraphs(text) {
        for (piece_offset, piece) in hard_split(para, options.max_size) {
            let piece_len = char_len(piece);
            let piece_start = base_offset + para_offset + piece_offset;

            if has_body && buffer_len + BREAK_LEN + piece_len > options.max_size {
                if buffer_len >= MIN_CHUNK_SIZE {
                    let end = chunk_start + buffer.len();
                    push_chunk(chunks, &buffer, title, chunk_start, end);
                }
                let budget = options
                    .overlap_size
                    .min(options.max_size.saturating_sub(piece_len + BREAK_LEN));
                let seed = overlap_seed(&buffer, budget).trim().to_string();

                chunk_start = piece_start.saturating_sub(seed.len() + BREAK_LEN);
                buffer_len = char_len(&seed);
                buffer = seed;
            }

            if buffer.is_empty() {
                chunk_start = piece_start;
            } else {
                buffer.push_str(PARAGRAPH_BREAK);
                buffer_len += BREAK_LEN;
            }
            buffer.push_str(piece);
            buffer_len += piece_len;
            has_body = true;
        }
    }

    if has_body && buffer_len >= MIN_CHUNK_SIZE {
        push_chunk(chunks, &buffer, title, chunk_start, base_offset + text.len());
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str, title: &str, start: usize, end: usize) {
    chunks.push(Chunk {
        index: chunks.len(),
        text: text.to_string(),
        section_title: title.to_string(),
        start_offset: start,
        end_offset: end,
    });
}

/// Trailing context of a closed chunk used to seed the next one.
///
/// Takes the last `size` characters. A tail that starts mid-word is moved
/// past its first whitespace when that whitespace lies in the first half of
/// the tail. A chunk no longer than `size` is returned whole.
fn overlap_seed(chunk: &str, size: usize) -> &str {
    if size == 0 {
        return "";
    }
    let total = char_len(chunk);
    if total <= size {
        return chunk;
    }

    let start = byte_index(chunk, total - size);
    let tail = &chunk[start..];
    if chunk[..start].ends_with(char::is_whitespace) {
        return tail.trim_start();
    }

    match tail.find(char::is_whitespace) {
        Some(ws) if ws < tail.len() / 2 => tail[ws..].trim_start(),
        _ => tail,
    }
}

/// Blank-line delimited paragraphs of `text`, trimmed, with their byte offsets.
fn paragraphs(text: &str) -> Vec<(usize, &str)> {
    fn push<'a>(out: &mut Vec<(usize, &'a str)>, raw: &'a str, offset: usize) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            out.push((offset + raw.len() - raw.trim_start().len(), trimmed));
        }
    }

    let mut out = Vec::new();
    let mut start = None;
    let mut end = 0;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                push(&mut out, &text[s..end], s);
            }
        } else {
            start.get_or_insert(pos);
            end = pos + line.len();
        }
        pos += line.len();
    }
    if let Some(s) = start {
        push(&mut out, &text[s..end], s);
    }
    out
}

/// Break a paragraph into pieces of at most `limit` characters.
///
/// Cuts at the last newline, else the last space, inside the limit. A run
/// without either is cut at exactly `limit` characters.
fn hard_split(para: &str, limit: usize) -> Vec<(usize, &str)> {
    if char_len(para) <= limit {
        return vec![(0, para)];
    }

    let mut pieces = Vec::new();
    let mut rest = para;
    let mut offset = 0;

    while !rest.is_empty() {
        let cut = if char_len(rest) <= limit {
            rest.len()
        } else {
            let max = byte_index(rest, limit);
            rest[..max]
                .rfind('\n')
                .or_else(|| rest[..max].rfind(' '))
                .filter(|&pos| pos > 0)
                .map(|pos| pos + 1)
                .unwrap_or(max)
        };

        let piece = rest[..cut].trim_end();
        if !piece.is_empty() {
            pieces.push((offset, piece));
        }

        let next = rest[cut..].trim_start();
        offset += rest.len() - next.len();
        rest = next;
    }
    pieces
}

/// Title of an ATX heading line, if `line` is one.
fn heading_title(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\n', '\r']);
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then_some(title)
}

fn is_fence(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("```") || line.starts_with("~~~")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `n`th character, or `s.len()` past the end.
fn byte_index(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
