//! Context-aware LRU cache.
//!
//! Identical queries may be answered differently depending on who asks
//! (permissions, request scope), so entries are keyed on the query *and* a
//! canonical serialization of the caller's context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use crate::olog_trace;

/// Caller context attached to a query.
pub type Context = Map<String, Value>;

/// Build the cache key for a query and its context.
///
/// Object keys are sorted at every nesting level, so two contexts holding
/// the same pairs in a different insertion order map to the same key.
pub fn cache_key(query: &str, context: &Context) -> String {
    let mut out = String::with_capacity(query.len() + 32);
    out.push_str(query);
    out.push_str("::{");
    for (i, (key, value)) in sorted_entries(context).into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_canonical_str(&mut out, key);
        out.push(':');
        write_canonical(&mut out, value);
    }
    out.push('}');
    out
}

fn sorted_entries(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push('{');
            for (i, (key, value)) in sorted_entries(map).into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_str(out, key);
                out.push(':');
                write_canonical(out, value);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_str(out: &mut String, s: &str) {
    // Value::String's Display produces the JSON-escaped form.
    out.push_str(&Value::String(s.to_string()).to_string());
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

struct Slot<V> {
    value: V,
    tick: u64,
}

/// Bounded LRU cache keyed by `(query, context)`.
///
/// Recency is tracked with a monotonically increasing tick: `order` maps
/// tick to key, so its first entry is always the least recently used.
pub struct ContextCache<V> {
    max_size: usize,
    store: HashMap<String, Slot<V>>,
    order: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> ContextCache<V> {
    /// Create a cache holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            store: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a cached value. A hit promotes the entry to most recently used.
    pub fn get(&mut self, query: &str, context: &Context) -> Option<&V> {
        let key = cache_key(query, context);
        let tick = self.bump();
        match self.store.get_mut(&key) {
            Some(slot) => {
                self.hits += 1;
                self.order.remove(&slot.tick);
                self.order.insert(tick, key);
                slot.tick = tick;
                olog_trace!("cache hit query={}", query);
                Some(&slot.value)
            }
            None => {
                self.misses += 1;
                olog_trace!("cache miss query={}", query);
                None
            }
        }
    }

    /// Insert or overwrite a value.
    ///
    /// Inserting a new key into a full cache evicts the least recently used
    /// entry first. Overwriting never evicts.
    pub fn put(&mut self, query: &str, context: &Context, value: V) {
        let key = cache_key(query, context);
        let tick = self.bump();

        if let Some(slot) = self.store.get_mut(&key) {
            self.order.remove(&slot.tick);
            self.order.insert(tick, key);
            slot.tick = tick;
            slot.value = value;
            return;
        }

        if self.store.len() >= self.max_size {
            self.evict_oldest();
        }
        self.order.insert(tick, key.clone());
        self.store.insert(key, Slot { value, tick });
    }

    fn evict_oldest(&mut self) {
        if let Some((_, oldest)) = self.order.pop_first() {
            olog_trace!("cache evict key={}", oldest);
            self.store.remove(&oldest);
            self.evictions += 1;
        }
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Whether an entry exists. Does not count as an access.
    pub fn contains(&self, query: &str, context: &Context) -> bool {
        self.store.contains_key(&cache_key(query, context))
    }

    /// Fraction of lookups that hit, or 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Drop every entry. Hit/miss counters are kept.
    pub fn clear(&mut self) {
        self.store.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.store.len(),
            capacity: self.max_size,
            hit_rate: self.hit_rate(),
        }
    }
}

impl<V> std::fmt::Debug for ContextCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("len", &self.store.len())
            .field("capacity", &self.max_size)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
