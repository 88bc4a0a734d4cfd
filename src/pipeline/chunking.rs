//! Derivation of retrieval units from an extraction record.
//!
//! Chunking policy: each structured field becomes exactly one unit; free-text
//! notes are split into units bounded by a token budget with no overlap
//! (prescription documents are short). Token counting prefers `tiktoken-rs`
//! and falls back to whitespace counting when the encoding is unavailable.

use crate::pipeline::types::{ChunkingError, ExtractionRecord, RetrievalUnit};
use semchunk_rs::Chunker;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Split an extraction record into write-once retrieval units.
///
/// Units carry no embedding yet; the embedding step fills them in. Duplicate
/// texts within one document are skipped, keeping the first occurrence.
pub(crate) fn units_from_record(
    record: &ExtractionRecord,
    note_chunk_tokens: usize,
) -> Result<Vec<RetrievalUnit>, ChunkingError> {
    if note_chunk_tokens == 0 {
        return Err(ChunkingError::InvalidChunkBudget);
    }

    let mut units = Vec::new();
    let mut seen = HashSet::new();
    let mut ordinal = 0usize;
    let mut skipped = 0usize;

    let mut push_unit = |text: &str, source_field: &str, units: &mut Vec<RetrievalUnit>| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        if !seen.insert(unit_hash(trimmed)) {
            skipped += 1;
            return;
        }
        units.push(RetrievalUnit {
            unit_id: format!("{source_field}-{ordinal}"),
            text: trimmed.to_string(),
            embedding: None,
            source_field: source_field.to_string(),
            ordinal,
        });
        ordinal += 1;
    };

    for field in &record.fields {
        push_unit(&field.value, &field.name, &mut units);
    }

    if let Some(notes) = record.raw_text.as_deref() {
        for chunk in chunk_notes(notes, note_chunk_tokens) {
            push_unit(&chunk, "note", &mut units);
        }
    }

    if skipped > 0 {
        tracing::debug!(
            document_id = %record.document_id,
            skipped,
            "Skipped duplicate units"
        );
    }

    Ok(units)
}

/// Split free-text notes into token-bounded segments, no overlap.
fn chunk_notes(text: &str, chunk_tokens: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let counter = token_counter();
    let chunker = Chunker::new(
        chunk_tokens,
        Box::new(move |segment: &str| counter.as_ref()(segment)),
    );
    chunker.chunk(text)
}

/// Prefer the `cl100k_base` encoding; fall back to whitespace counting.
fn token_counter() -> TokenCounter {
    match cl100k_base() {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        Err(error) => {
            tracing::warn!(error = %error, "Tokenizer unavailable; falling back to whitespace counter");
            Arc::new(|segment: &str| {
                let tokens = segment.split_whitespace().count();
                if tokens == 0 && !segment.is_empty() {
                    1
                } else {
                    tokens
                }
            })
        }
    }
}

/// Deterministic digest of a unit's text, used for in-document dedupe.
fn unit_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
