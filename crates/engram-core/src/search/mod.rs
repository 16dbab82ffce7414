//! Search - vector index and hybrid score fusion
//!
//! The store performs keyword search through SQLite FTS5; this module holds
//! the in-memory vector side (HNSW with an exact-scan fast path for small
//! corpora) and the fusion math that combines the two candidate lists.

mod fusion;
mod vector;

pub use fusion::{linear_combination, normalize_scores};
pub use vector::{VectorIndex, BRUTE_FORCE_THRESHOLD};

/// Sanitize a raw query for FTS5 MATCH.
///
/// Every alphanumeric token is double-quoted so user input can never inject
/// FTS5 operators (`NEAR`, `*`, column filters), and tokens are OR-joined:
/// a document matching any token ranks, with BM25 rewarding the ones that
/// match more. Returns an empty string when no token survives; callers
/// treat that as "no keyword pass".
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{}\"", token))
        .collect::<Vec<_>>()
        .join(" OR ")
}
