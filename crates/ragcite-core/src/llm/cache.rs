//! Embedding cache (LRU + TTL) to avoid redundant provider calls

use super::Embedder;
use crate::db::embedding_key;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

struct Node {
    key: String,
    value: Vec<f32>,
    inserted_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly-linked recency list over a slab; `head` is most recently used
#[derive(Default)]
struct LruState {
    index: HashMap<String, usize>,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    closed: bool,
}

impl LruState {
    fn node(&self, slot: usize) -> Option<&Node> {
        self.slots.get(slot).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node> {
        self.slots.get_mut(slot).and_then(|n| n.as_mut())
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.node(slot) {
            Some(n) => (n.prev, n.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(n) = self.node_mut(slot) {
            n.prev = None;
            n.next = None;
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(n) = self.node_mut(slot) {
            n.prev = None;
            n.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(n) = self.node_mut(h) {
                n.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn remove(&mut self, slot: usize) -> Option<Node> {
        self.unlink(slot);
        let node = self.slots.get_mut(slot).and_then(|n| n.take())?;
        self.index.remove(&node.key);
        self.free.push(slot);
        Some(node)
    }

    fn insert(&mut self, node: Node) -> usize {
        let key = node.key.clone();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_front(slot);
        slot
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Thread-safe LRU cache with per-entry TTL, keyed by embedding key
pub struct EmbeddingCache {
    state: Mutex<LruState>,
    capacity: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        // a poisoned lock still holds a consistent list: every mutation
        // completes before any call that could panic
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get cached value if present and not expired; marks it most recently used
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }

        let Some(slot) = state.index.get(key).copied() else {
            state.misses += 1;
            return None;
        };

        let expired = state
            .node(slot)
            .map(|n| n.inserted_at.elapsed() >= self.ttl)
            .unwrap_or(true);
        if expired {
            state.remove(slot);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        state.unlink(slot);
        state.push_front(slot);
        state.hits += 1;
        state.node(slot).map(|n| n.value.clone())
    }

    /// Insert or refresh an entry, evicting the least recently used when full
    pub fn put(&self, key: String, value: Vec<f32>) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let now = Instant::now();

        if let Some(slot) = state.index.get(&key).copied() {
            if let Some(n) = state.node_mut(slot) {
                n.value = value;
                n.inserted_at = now;
            }
            state.unlink(slot);
            state.push_front(slot);
            return;
        }

        while state.len() >= self.capacity {
            let Some(tail) = state.tail else { break };
            state.remove(tail);
            state.evictions += 1;
        }

        state.insert(Node {
            key,
            value,
            inserted_at: now,
            prev: None,
            next: None,
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            size: state.len(),
            capacity: self.capacity,
            hit_rate: if lookups > 0 {
                state.hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    /// Clear all entries, keeping statistics
    pub fn clear(&self) {
        let mut state = self.lock();
        state.index.clear();
        state.slots.clear();
        state.free.clear();
        state.head = None;
        state.tail = None;
    }

    /// Drop all entries; later lookups miss and inserts are ignored
    pub fn close(&self) {
        self.clear();
        self.lock().closed = true;
    }
}

/// Embedder wrapper that serves repeated texts from an `EmbeddingCache`
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn inner(&self) -> &Arc<dyn Embedder> {
        &self.inner
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.inner.model_name();
        let keys: Vec<String> = texts.iter().map(|t| embedding_key(t, model)).collect();

        let mut resolved: HashMap<&str, Vec<f32>> = HashMap::new();
        let mut miss_keys: Vec<&str> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();
        for (key, text) in keys.iter().zip(texts) {
            if resolved.contains_key(key.as_str()) || miss_keys.contains(&key.as_str()) {
                continue;
            }
            match self.cache.get(key) {
                Some(v) => {
                    resolved.insert(key.as_str(), v);
                }
                None => {
                    miss_keys.push(key.as_str());
                    miss_texts.push(text.clone());
                }
            }
        }

        if !miss_texts.is_empty() {
            tracing::debug!(
                total = texts.len(),
                misses = miss_texts.len(),
                "Embedding cache misses"
            );
            let fresh = self.inner.embed_batch(&miss_texts).await?;
            if fresh.len() != miss_texts.len() {
                return Err(ProviderError::invalid_response(format!(
                    "provider returned {} embeddings for {} texts",
                    fresh.len(),
                    miss_texts.len()
                ))
                .into());
            }
            for (key, vector) in miss_keys.into_iter().zip(fresh) {
                self.cache.put(key.to_string(), vector.clone());
                resolved.insert(key, vector);
            }
        }

        keys.iter()
            .map(|k| {
                resolved.get(k.as_str()).cloned().ok_or_else(|| {
                    ProviderError::invalid_response("embedding missing after merge").into()
                })
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
