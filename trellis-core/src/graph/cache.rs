//! Resolution Cache
//!
//! The cache maps node identities to deferred results. It is the only thing
//! that deduplicates work inside a pass, and the only way to inject or
//! override a value: seed an entry under an identity before resolving.
//!
//! A cache lives as long as the caller keeps it. Passing the same cache to
//! several passes shares their results; a fresh cache per pass isolates them.
//!
//! # Concurrency
//!
//! Entries are written with "set if absent" semantics at the first request
//! for an identity. Concurrent readers see either nothing or the single
//! canonical deferred for that identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use tracing::trace;

use super::node::{Identity, NodeValue};
use crate::error::{ResolveError, ResolveResult};

/// A result that may still be in flight.
pub type Deferred<V> = Shared<BoxFuture<'static, ResolveResult<V>>>;

/// Build an already settled deferred.
pub(crate) fn settled<V: NodeValue>(outcome: ResolveResult<V>) -> Deferred<V> {
    future::ready(outcome).boxed().shared()
}

/// A mapping from identity to deferred result.
pub struct Cache<V> {
    entries: Arc<DashMap<Identity, Deferred<V>>>,
}

impl<V: NodeValue> Cache<V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Seed (or override) the value resolved under `identity`.
    pub fn insert(&self, identity: impl Into<Identity>, value: V) {
        let identity = identity.into();
        trace!(%identity, "seeding cache entry");
        self.entries.insert(identity, settled(Ok(value)));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, identity: impl Into<Identity>, value: V) -> Self {
        self.insert(identity, value);
        self
    }

    /// Get the deferred stored under `identity`.
    pub fn get(&self, identity: &Identity) -> Option<Deferred<V>> {
        self.entries.get(identity).map(|entry| entry.value().clone())
    }

    /// Return the entry under `identity`, storing the one built by `make`
    /// if there is none. `make` only runs when the entry is vacant.
    pub(crate) fn get_or_insert_with(
        &self,
        identity: Identity,
        make: impl FnOnce() -> Deferred<V>,
    ) -> Deferred<V> {
        match self.entries.entry(identity) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(make()).value().clone(),
        }
    }

    /// Wait for the entry under `identity`, if there is one.
    pub async fn settled(&self, identity: &Identity) -> Option<ResolveResult<V>> {
        let deferred = self.get(identity)?;
        Some(deferred.await)
    }

    /// Load a cache from JSON.
    ///
    /// Accepts an object (keys become string identities) or an array of
    /// `[key, value]` pairs with string keys.
    pub fn from_json(value: Json) -> ResolveResult<Self>
    where
        V: DeserializeOwned,
    {
        let cache = Self::new();
        match value {
            Json::Object(map) => {
                for (key, value) in map {
                    let value = decode::<V>(&key, value)?;
                    cache.insert(key, value);
                }
            }
            Json::Array(pairs) => {
                for (index, pair) in pairs.into_iter().enumerate() {
                    let (key, value) = split_pair(index, pair)?;
                    let value = decode::<V>(&key, value)?;
                    cache.insert(key, value);
                }
            }
            Json::Null => return Err(shape_error("null")),
            Json::Bool(_) => return Err(shape_error("a boolean")),
            Json::Number(_) => return Err(shape_error("a number")),
            Json::String(_) => return Err(shape_error("a string")),
        }
        Ok(cache)
    }
}

impl<V> Cache<V> {
    /// Whether an entry exists under `identity`.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Whether an entry exists under the string identity `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&Identity::Key(Arc::from(key)))
    }

    /// Number of entries, settled or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn shape_error(found: &str) -> ResolveError {
    ResolveError::InvalidCacheShape {
        found: found.to_string(),
    }
}

fn split_pair(index: usize, pair: Json) -> ResolveResult<(String, Json)> {
    let Json::Array(mut items) = pair else {
        return Err(shape_error(&format!("pair {index} is not a [key, value] array")));
    };
    if items.len() != 2 {
        return Err(shape_error(&format!(
            "pair {index} has {} elements instead of 2",
            items.len()
        )));
    }
    let value = items.pop().unwrap_or(Json::Null);
    match items.pop() {
        Some(Json::String(key)) => Ok((key, value)),
        _ => Err(shape_error(&format!("pair {index} does not have a string key"))),
    }
}

fn decode<V: DeserializeOwned>(key: &str, value: Json) -> ResolveResult<V> {
    serde_json::from_value(value)
        .map_err(|err| shape_error(&format!("entry {key:?} that does not decode ({err})")))
}

impl<V: NodeValue> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<V: NodeValue, K: Into<Identity>> FromIterator<(K, V)> for Cache<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let cache = Self::new();
        for (identity, value) in iter {
            cache.insert(identity, value);
        }
        cache
    }
}

impl<V: NodeValue> From<HashMap<String, V>> for Cache<V> {
    fn from(map: HashMap<String, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<V: NodeValue + DeserializeOwned> TryFrom<Json> for Cache<V> {
    type Error = ResolveError;

    fn try_from(value: Json) -> ResolveResult<Self> {
        Self::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn seeded_entries_are_settled() {
        let cache: Cache<Json> = Cache::new().with("mul", json!(10));
        assert!(cache.contains_key("mul"));
        let value = cache.settled(&Identity::from("mul")).await;
        assert_eq!(value.unwrap().unwrap(), json!(10));
    }

    #[tokio::test]
    async fn first_insert_wins() {
        let cache: Cache<String> = Cache::new();
        let first = cache.get_or_insert_with(Identity::from("k"), || settled(Ok("first".into())));
        let second = cache.get_or_insert_with(Identity::from("k"), || {
            panic!("occupied entry must not be rebuilt")
        });
        assert_eq!(first.await.unwrap(), "first");
        assert_eq!(second.await.unwrap(), "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn loads_object() {
        let cache: Cache<Json> = Cache::from_json(json!({ "a": 1, "b": "two" })).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key("a"));
        assert!(cache.contains_key("b"));
    }

    #[test]
    fn loads_pairs() {
        let cache: Cache<Json> = Cache::try_from(json!([["a", 1], ["b", [1, 2]]])).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn rejects_other_shapes() {
        for input in [json!(3), json!("cache"), json!(null), json!(true)] {
            let err = Cache::<Json>::from_json(input).unwrap_err();
            assert!(matches!(err, ResolveError::InvalidCacheShape { .. }));
        }
    }

    #[test]
    fn rejects_malformed_pairs() {
        for input in [json!([["a"]]), json!([[1, 2]]), json!([5])] {
            let err = Cache::<Json>::from_json(input).unwrap_err();
            assert!(matches!(err, ResolveError::InvalidCacheShape { .. }));
        }
    }

    #[test]
    fn rejects_undecodable_values() {
        let err = Cache::<String>::from_json(json!({ "a": 1 })).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidCacheShape { .. }));
    }

    #[test]
    fn collects_from_pairs() {
        let cache: Cache<String> = vec![("a", "1".to_string()), ("b", "2".to_string())]
            .into_iter()
            .collect();
        assert!(cache.contains_key("a"));

        let mut map = HashMap::new();
        map.insert("c".to_string(), "3".to_string());
        let cache = Cache::from(map);
        assert!(cache.contains(&Identity::from("c")));
    }

    #[test]
    fn clones_share_entries() {
        let cache: Cache<String> = Cache::new();
        let other = cache.clone();
        other.insert("k", "v".into());
        assert!(cache.contains_key("k"));
    }
}
