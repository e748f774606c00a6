//! Boundary-aware document splitting with overlap carry.
//!
//! Code documents cut at brace-depth-zero line ends ahead of a top-level
//! line; prose cuts at blank-line paragraph breaks. Either way a hard cut at
//! `max_chunk_size` is the fallback, so no chunk ever exceeds the cap.

use chrono::{DateTime, Utc};

use crate::document::{DocKind, Document};
use crate::error::{IndexError, Result};

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Preferred chunk size in bytes; cuts are taken once a chunk reaches it.
    pub chunk_size: usize,
    /// Bytes of the previous chunk repeated at the start of the next one.
    pub chunk_overlap: usize,
    /// Hard upper bound on chunk length, overlap included.
    pub max_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_chunk_size: 1500,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Rejects configurations that could never terminate or never overlap
    /// correctly.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IndexError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IndexError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_chunk_size < self.chunk_size {
            return Err(IndexError::Config(format!(
                "max_chunk_size ({}) must be at least chunk_size ({})",
                self.max_chunk_size, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A contiguous slice of a document's text.
///
/// `text` spans `start..end` of the source document and begins with the
/// final `overlap` bytes of the previous chunk; concatenating chunks in
/// `seq` order while skipping each chunk's overlap prefix reconstructs the
/// document exactly.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub doc_ident: String,
    pub kind: DocKind,
    pub seq: usize,
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
    pub text: String,
    pub header: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Chunk {
    /// Text handed to the embedder: the self-describing header plus the
    /// chunk body. Display and reconstruction use `text` alone.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.header, self.text)
    }
}

/// Split a document into bounded, overlapping chunks.
///
/// Pure function of input and configuration: the same document always
/// yields the same chunks.
///
/// # Errors
///
/// Fails fast on an invalid configuration; never fails on document content.
pub fn chunk(doc: &Document, config: &ChunkerConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    let text = doc.text.as_str();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let boundaries = match doc.kind {
        DocKind::Code => code_boundaries(text),
        DocKind::Commit | DocKind::PullRequest => paragraph_boundaries(text),
    };
    let cuts = compute_cuts(text, &boundaries, config);

    let header = doc.header();
    let mut chunks = Vec::with_capacity(cuts.len());
    let mut body_start = 0;
    for (seq, &cut) in cuts.iter().enumerate() {
        let overlap_target = if seq == 0 {
            0
        } else {
            let body_len = cut - body_start;
            config
                .chunk_overlap
                .min(config.max_chunk_size.saturating_sub(body_len))
        };
        let start = text.ceil_char_boundary(body_start - overlap_target);
        chunks.push(Chunk {
            doc_ident: doc.ident.clone(),
            kind: doc.kind,
            seq,
            start,
            end: cut,
            overlap: body_start - start,
            text: text[start..cut].to_owned(),
            header: header.clone(),
            timestamp: doc.timestamp,
        });
        body_start = cut;
    }

    Ok(chunks)
}

/// Exclusive end offsets of each chunk body. The last offset is always
/// `text.len()`; a remainder no larger than `max_chunk_size` stays whole.
fn compute_cuts(text: &str, boundaries: &[usize], config: &ChunkerConfig) -> Vec<usize> {
    let mut cuts = Vec::new();
    let mut start = 0;

    while text.len() - start > config.max_chunk_size {
        let min_cut = start + config.chunk_size;
        let max_cut = start + config.max_chunk_size;
        let cut = boundaries
            .iter()
            .copied()
            .filter(|&b| b >= min_cut && b <= max_cut)
            .max()
            .unwrap_or_else(|| text.floor_char_boundary(max_cut));
        // A multibyte char straddling a tiny budget must still advance.
        let cut = if cut <= start {
            text.ceil_char_boundary(start + 1)
        } else {
            cut
        };
        cuts.push(cut);
        start = cut;
    }
    cuts.push(text.len());
    cuts
}

/// Candidate cut offsets for structured source: the end of any line where
/// brace depth has returned to zero and the following line starts at the
/// top level (covers both brace- and indentation-delimited languages).
fn code_boundaries(text: &str) -> Vec<usize> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = Vec::new();
    let mut depth: i64 = 0;
    let mut offset = 0;

    for (i, line) in lines.iter().enumerate() {
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        // Unbalanced input never drives the counter negative for good.
        depth = depth.max(0);
        offset += line.len();

        if depth == 0 {
            let next_top_level = lines
                .get(i + 1)
                .is_none_or(|next| next.chars().next().is_none_or(|c| !c.is_whitespace()));
            if next_top_level {
                out.push(offset);
            }
        }
    }
    out
}

/// Candidate cut offsets for prose: the end of each blank-line run, so a
/// paragraph keeps its trailing blank lines.
fn paragraph_boundaries(text: &str) -> Vec<usize> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = Vec::new();
    let mut offset = 0;

    for (i, line) in lines.iter().enumerate() {
        offset += line.len();
        let blank = line.trim().is_empty();
        let next_non_blank = lines.get(i + 1).is_some_and(|next| !next.trim().is_empty());
        if blank && next_non_blank {
            out.push(offset);
        }
    }
    out
}
