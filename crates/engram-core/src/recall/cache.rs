//! Recall-result cache
//!
//! LRU keyed by (project, canonical query, context digest, depth) with a
//! TTL. Invalidation is coarse: each entry remembers the project's write
//! epoch at insert time, and any later layer write bumps the epoch,
//! orphaning the entry.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{RecallResponse, SessionSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    project_id: String,
    canonical_query: String,
    context_digest: String,
    depth: u8,
}

struct CacheEntry {
    response: RecallResponse,
    epoch: u64,
    inserted_at: Instant,
}

/// TTL + epoch guarded LRU over recall responses
pub struct RecallCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl RecallCache {
    /// Create a cache with the given capacity and TTL
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero"),
            )),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Whitespace-collapsed lowercase query
    pub fn canonical_query(query: &str) -> String {
        query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Short digest of the session context
    pub fn context_digest(session: &SessionSnapshot) -> String {
        let mut hasher = Sha256::new();
        hasher.update(session.session_id.as_deref().unwrap_or(""));
        hasher.update(b"\x00");
        hasher.update(session.task.as_deref().unwrap_or(""));
        hasher.update(b"\x00");
        hasher.update(session.phase.as_deref().unwrap_or(""));
        let digest = hasher.finalize();
        format!("{:x}", digest)[..16].to_string()
    }

    /// Fetch a live entry: present, unexpired, and from the current epoch.
    /// The returned response carries `cache_hit = true`.
    pub fn get(
        &self,
        project_id: &str,
        query: &str,
        session: &SessionSnapshot,
        depth: u8,
        current_epoch: u64,
    ) -> Option<RecallResponse> {
        let key = CacheKey {
            project_id: project_id.to_string(),
            canonical_query: Self::canonical_query(query),
            context_digest: Self::context_digest(session),
            depth,
        };
        let mut cache = self.inner.lock().ok()?;
        let entry = cache.get(&key)?;
        if entry.epoch != current_epoch || entry.inserted_at.elapsed() > self.ttl {
            cache.pop(&key);
            return None;
        }
        let mut response = entry.response.clone();
        response.cache_hit = true;
        Some(response)
    }

    /// Store a response under the current epoch
    pub fn put(
        &self,
        project_id: &str,
        query: &str,
        session: &SessionSnapshot,
        depth: u8,
        epoch: u64,
        response: &RecallResponse,
    ) {
        let key = CacheKey {
            project_id: project_id.to_string(),
            canonical_query: Self::canonical_query(query),
            context_digest: Self::context_digest(session),
            depth,
        };
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(
                key,
                CacheEntry {
                    response: response.clone(),
                    epoch,
                    inserted_at: Instant::now(),
                },
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
