//! Text chunking with semantic boundaries and a fixed-window fallback

use crate::config::ChunkingConfig;
use crate::types::Chunk;

/// Approximate token count: one token per four characters, rounded up
pub fn approx_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Splits normalized text into bounded-size segments
///
/// Three semantic tiers: blank-line paragraphs, sentence accumulation within
/// a paragraph, clause accumulation within an oversized sentence. When the
/// input has no usable structure at all, a fixed-size sliding window pass
/// covers every character instead.
pub struct Chunker {
    token_limit: usize,
    window_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            token_limit: config.token_limit.max(1),
            window_chars: config.window_chars.max(2),
            overlap_chars: config.overlap_chars.min(config.window_chars.saturating_sub(1)),
        }
    }

    /// Chunk text in document order with strictly increasing ordinals from 0
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces: Vec<String> = Vec::new();
        for paragraph in split_paragraphs(text) {
            self.chunk_paragraph(paragraph, &mut pieces);
        }

        // No paragraph/sentence/clause structure to cut on: the semantic
        // tiers either produced nothing or one irreducible blob. Sliding
        // windows guarantee coverage in that case.
        let unusable = pieces.is_empty()
            || (pieces.len() == 1 && approx_tokens(&pieces[0]) > self.token_limit);
        if unusable {
            tracing::debug!(
                "Semantic chunking found no structure ({} chars), using window fallback",
                text.chars().count()
            );
            pieces = self.window_fallback(text);
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| Chunk::new(i as u32, piece))
            .collect()
    }

    /// Tier 2: accumulate sentences up to the token budget
    fn chunk_paragraph(&self, paragraph: &str, out: &mut Vec<String>) {
        let mut buffer = String::new();

        for sentence in split_sentences(paragraph) {
            if approx_tokens(sentence) > self.token_limit {
                // Oversized sentence: flush what we have, then go to clauses
                flush(&mut buffer, out);
                self.chunk_clauses(sentence, out);
                continue;
            }

            if !buffer.is_empty()
                && approx_tokens(&buffer) + approx_tokens(sentence) > self.token_limit
            {
                flush(&mut buffer, out);
            }
            buffer.push_str(sentence);
        }

        flush(&mut buffer, out);
    }

    /// Tier 3: accumulate clauses of a single oversized sentence
    fn chunk_clauses(&self, sentence: &str, out: &mut Vec<String>) {
        let mut buffer = String::new();

        for clause in split_clauses(sentence) {
            if approx_tokens(clause) > self.token_limit {
                // Irreducible: a lone clause over the budget is emitted as-is
                flush(&mut buffer, out);
                let trimmed = clause.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
                continue;
            }

            if !buffer.is_empty()
                && approx_tokens(&buffer) + approx_tokens(clause) > self.token_limit
            {
                flush(&mut buffer, out);
            }
            buffer.push_str(clause);
        }

        flush(&mut buffer, out);
    }

    /// Fixed-size sliding windows: size W, overlap O, advance W - O,
    /// final window clipped; every character is covered
    fn window_fallback(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.window_chars - self.overlap_chars;
        let mut windows = Vec::new();
        let mut start = 0usize;

        loop {
            let end = (start + self.window_chars).min(chars.len());
            windows.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        windows
    }
}

fn flush(buffer: &mut String, out: &mut Vec<String>) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    buffer.clear();
}

/// Tier 1: split on blank-line boundaries
fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start = 0usize;
    let bytes = text.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'\n' {
            // A newline followed by an (optionally whitespace-only) empty
            // line terminates the paragraph
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t' || bytes[j] == b'\r') {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'\n' {
                paragraphs.push(&text[start..i]);
                while j < bytes.len() && bytes[j] == b'\n' {
                    j += 1;
                }
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    if start < text.len() {
        paragraphs.push(&text[start..]);
    }
    paragraphs.retain(|p| !p.trim().is_empty());
    paragraphs
}

/// Split on terminal punctuation followed by whitespace, keeping the
/// punctuation and trailing whitespace attached to the sentence
fn split_sentences(text: &str) -> Vec<&str> {
    split_after(text, |c| matches!(c, '.' | '!' | '?'))
}

/// Split on clause punctuation, same attachment rule
fn split_clauses(text: &str) -> Vec<&str> {
    split_after(text, |c| matches!(c, ',' | ';' | ':' | '\u{2013}' | '\u{2014}'))
}

/// Split `text` after any char matching `is_boundary` that is followed by
/// whitespace; the separator and the whitespace stay with the left piece so
/// concatenating pieces reproduces the input
fn split_after(text: &str, is_boundary: impl Fn(char) -> bool) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !is_boundary(c) {
            continue;
        }
        match chars.peek() {
            Some(&(next_idx, next_c)) if next_c.is_whitespace() => {
                // Consume the whitespace run into this piece
                let mut end = next_idx;
                while let Some(&(wi, wc)) = chars.peek() {
                    if wc.is_whitespace() {
                        end = wi + wc.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                pieces.push(&text[start..end]);
                start = end;
            }
            None => {
                // Terminal punctuation at end of text closes the piece
                pieces.push(&text[start..idx + c.len_utf8()]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
