//! In-memory vector index with project scoping
//!
//! Exact cosine scan below [`BRUTE_FORCE_THRESHOLD`], HNSW
//! (`instant-distance`) above it. Inserts after a build mark the index
//! dirty; the HNSW graph is rebuilt lazily on the next search once the
//! dirty share grows past a small fraction, and the exact path answers
//! queries in between so results never go stale.
//!
//! HNSW cannot pre-filter by project, so filtered searches oversample and
//! drop foreign rows; the exact path filters directly.

use std::collections::HashMap;

use instant_distance::{Builder, HnswMap, Point, Search};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Below this many vectors an exact scan beats graph traversal
pub const BRUTE_FORCE_THRESHOLD: usize = 512;

/// Rebuild the HNSW graph when dirty inserts exceed this share of the total
const REBUILD_DIRTY_FRACTION: f32 = 0.1;

/// Oversampling factor for project-filtered HNSW searches
const FILTER_OVERSAMPLE: usize = 4;

// ============================================================================
// POINT ADAPTER
// ============================================================================

/// Unit-normalized vector wrapped for instant-distance
#[derive(Clone, Debug)]
struct IndexPoint {
    normalized: Vec<f32>,
}

impl IndexPoint {
    fn from_vector(vector: &[f32]) -> Self {
        let norm = vector
            .iter()
            .map(|x| x * x)
            .sum::<f32>()
            .sqrt()
            .max(f32::EPSILON);
        Self {
            normalized: vector.iter().map(|x| x / norm).collect(),
        }
    }
}

impl Point for IndexPoint {
    /// Cosine distance; pre-normalized vectors make this 1 - dot
    fn distance(&self, other: &Self) -> f32 {
        if self.normalized.len() != other.normalized.len() {
            return 1.0;
        }
        let dot: f32 = self
            .normalized
            .iter()
            .zip(other.normalized.iter())
            .map(|(a, b)| a * b)
            .sum();
        (1.0 - dot).max(0.0)
    }
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// Project-scoped vector index over string ids
pub struct VectorIndex {
    dims: usize,
    /// id -> (project_id, normalized vector)
    entries: HashMap<String, (String, Vec<f32>)>,
    /// Built HNSW graph; None until the corpus outgrows the exact path
    map: Option<HnswMap<IndexPoint, String>>,
    /// Inserts/removals since the last build
    dirty: usize,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimensionality
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: HashMap::new(),
            map: None,
            dirty: 0,
        }
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace a vector. Mismatched dimensions are ignored with a
    /// warning; the row simply stays out of vector search.
    pub fn insert(&mut self, project_id: &str, id: &str, vector: &[f32]) {
        if vector.len() != self.dims {
            tracing::warn!(
                id,
                expected = self.dims,
                got = vector.len(),
                "skipping vector with wrong dimensionality"
            );
            return;
        }
        let point = IndexPoint::from_vector(vector);
        self.entries
            .insert(id.to_string(), (project_id.to_string(), point.normalized));
        self.dirty += 1;
    }

    /// Remove a vector by id
    pub fn remove(&mut self, id: &str) {
        if self.entries.remove(id).is_some() {
            self.dirty += 1;
        }
    }

    /// Nearest neighbors within one project, as (id, cosine similarity)
    /// descending, filtered to `similarity >= min_similarity`.
    pub fn search(
        &mut self,
        project_id: &str,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Vec<(String, f32)> {
        if k == 0 || self.entries.is_empty() || query.len() != self.dims {
            return vec![];
        }
        if self.entries.len() <= BRUTE_FORCE_THRESHOLD {
            return self.exact_search(project_id, query, k, min_similarity);
        }
        self.rebuild_if_dirty();
        match &self.map {
            Some(map) => {
                let point = IndexPoint::from_vector(query);
                let mut search = Search::default();
                let mut results = Vec::with_capacity(k);
                for item in map.search(&point, &mut search).take(k * FILTER_OVERSAMPLE) {
                    let id = item.value;
                    let Some((project, _)) = self.entries.get(id) else {
                        continue; // removed since last build
                    };
                    if project != project_id {
                        continue;
                    }
                    let similarity = 1.0 - item.distance;
                    if similarity < min_similarity {
                        break; // results arrive distance-ascending
                    }
                    results.push((id.clone(), similarity));
                    if results.len() >= k {
                        break;
                    }
                }
                results
            }
            None => self.exact_search(project_id, query, k, min_similarity),
        }
    }

    fn exact_search(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Vec<(String, f32)> {
        let q = IndexPoint::from_vector(query);
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .filter(|(_, (project, _))| project == project_id)
            .map(|(id, (_, normalized))| {
                let dot: f32 = q
                    .normalized
                    .iter()
                    .zip(normalized.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                (id.clone(), dot)
            })
            .filter(|(_, sim)| *sim >= min_similarity)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    fn rebuild_if_dirty(&mut self) {
        let needs_build = self.map.is_none()
            || self.dirty as f32 > self.entries.len() as f32 * REBUILD_DIRTY_FRACTION;
        if !needs_build {
            return;
        }
        let (points, values): (Vec<IndexPoint>, Vec<String>) = self
            .entries
            .iter()
            .map(|(id, (_, normalized))| {
                (
                    IndexPoint {
                        normalized: normalized.clone(),
                    },
                    id.clone(),
                )
            })
            .unzip();
        // Seeded build keeps search results reproducible across runs
        self.map = Some(Builder::default().seed(42).build(points, values));
        self.dirty = 0;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn basis(dims: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn exact_search_ranks_by_similarity() {
        let mut index = VectorIndex::new(4);
        index.insert("p1", "a", &[1.0, 0.0, 0.0, 0.0]);
        index.insert("p1", "b", &[0.9, 0.1, 0.0, 0.0]);
        index.insert("p1", "c", &[0.0, 0.0, 1.0, 0.0]);

        let results = index.search("p1", &[1.0, 0.0, 0.0, 0.0], 3, 0.5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "b");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn search_is_project_scoped() {
        let mut index = VectorIndex::new(4);
        index.insert("p1", "a", &basis(4, 0));
        index.insert("p2", "b", &basis(4, 0));

        let results = index.search("p1", &basis(4, 0), 10, 0.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn wrong_dimensions_are_skipped() {
        let mut index = VectorIndex::new(4);
        index.insert("p1", "bad", &[1.0, 0.0]);
        assert!(index.is_empty());
        assert!(index.search("p1", &[1.0, 0.0], 5, 0.0).is_empty());
    }

    #[test]
    fn remove_drops_entries() {
        let mut index = VectorIndex::new(4);
        index.insert("p1", "a", &basis(4, 0));
        index.remove("a");
        assert!(index.search("p1", &basis(4, 0), 5, 0.0).is_empty());
    }

    #[test]
    fn k_zero_returns_empty() {
        let mut index = VectorIndex::new(4);
        index.insert("p1", "a", &basis(4, 0));
        assert!(index.search("p1", &basis(4, 0), 0, 0.0).is_empty());
    }

    #[test]
    fn hnsw_path_matches_exact_on_top_hit() {
        let dims = 8;
        let mut index = VectorIndex::new(dims);
        // Enough vectors to cross the brute-force threshold
        for i in 0..(BRUTE_FORCE_THRESHOLD + 32) {
            let mut v = vec![0.0_f32; dims];
            v[i % dims] = 1.0;
            v[(i + 1) % dims] = (i % 13) as f32 / 13.0;
            index.insert("p1", &format!("id-{}", i), &v);
        }
        let query = basis(dims, 3);
        let results = index.search("p1", &query, 5, 0.0);
        assert!(!results.is_empty());
        // Top hit must be dominated by axis 3
        assert!(results[0].1 > 0.7, "top similarity was {}", results[0].1);
    }
}
