//! Utilities
//!
//! Helpers that sit around compute functions and handles. None of them take
//! part in graph resolution.
//!
//! - [`LruCache`]: bounded least-recently-used map with optional TTL
//! - [`CachedFn`]: async function decorator backed by an [`LruCache`]
//! - [`MemoFn`]: single-slot memoizer for plain functions

mod cached;
mod lru;
mod memoize;

pub use cached::{CacheOptions, CachedFn};
pub use lru::LruCache;
pub use memoize::MemoFn;
