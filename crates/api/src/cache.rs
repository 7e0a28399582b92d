use dashmap::DashMap;
use extract::{SchemaVariant, Subject};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Normalized analyses keyed by a hash of variant and input.
pub struct AnalysisCache {
    entries: Arc<DashMap<String, Value>>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl AnalysisCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn key(variant: SchemaVariant, subject: &Subject) -> String {
        let mut hasher = Sha256::new();
        hasher.update(variant.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(subject.kind().as_bytes());
        hasher.update([0u8]);
        match subject {
            Subject::Text(text) => hasher.update(text.trim().as_bytes()),
            Subject::Image(image) => hasher.update(image.data.as_bytes()),
        }
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, value: Value) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self.entries.iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(key, value);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: usize,
    pub misses: usize,
}
