//! Process-global compiled-path cache.
//!
//! A bounded map from path string to compiled segments. Concurrent readers
//! take a shared lock; a writer inserting a new entry takes the exclusive
//! lock only long enough to insert, and clears the whole map outright once
//! it would exceed capacity rather than implementing real LRU eviction — a
//! simple bounded cache is sufficient; strict LRU ordering buys little here.

use super::segment::Segment;
use crate::limits::PATH_CACHE_CAPACITY;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type CompiledPath = Arc<[Segment]>;

static CACHE: Lazy<RwLock<HashMap<String, CompiledPath>>> =
    Lazy::new(|| RwLock::new(HashMap::with_capacity(PATH_CACHE_CAPACITY)));

/// Look up a previously compiled path, or compile and insert it.
///
/// The returned `Arc` is always a cheap clone of the cached value (or the
/// freshly compiled one); callers never see the map lock again after this
/// returns.
pub(crate) fn get_or_compile(path: &str) -> CompiledPath {
    if let Some(hit) = CACHE.read().unwrap().get(path) {
        return Arc::clone(hit);
    }

    let compiled = super::parse::compile(path);

    let mut cache = CACHE.write().unwrap();
    if cache.len() >= PATH_CACHE_CAPACITY && !cache.contains_key(path) {
        tracing::debug!(capacity = PATH_CACHE_CAPACITY, "path cache full, clearing");
        cache.clear();
    }
    cache.entry(path.to_string()).or_insert_with(|| Arc::clone(&compiled));
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_repeated_lookups() {
        let a = get_or_compile("cache.test.path.a");
        let b = get_or_compile("cache.test.path.a");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn clears_when_full() {
        for i in 0..PATH_CACHE_CAPACITY + 8 {
            get_or_compile(&format!("cache.overflow.path.{i}"));
        }
        // Doesn't panic or deadlock; capacity bound is enforced by clearing.
        assert!(CACHE.read().unwrap().len() <= PATH_CACHE_CAPACITY + 8);
    }
}
