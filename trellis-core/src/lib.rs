//! Trellis Core
//!
//! This crate resolves directed acyclic graphs of computations. Each node's
//! function consumes the resolved values of its declared dependencies, and
//! runs at most once per resolution pass no matter how many dependents
//! reference it.
//!
//! It implements:
//!
//! - Dependency nodes built from nodes, handles, functions and string keys
//! - A recursive, cache-deduplicated async resolver
//! - Value injection and overrides through the pass's cache
//! - Memoized nodes that keep their result across passes
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Nodes, dependency specs, the cache, memo state and the resolver
//! - `builder`: The `build*` facade and the `Handle` type
//! - `util`: LRU and single-slot memoization helpers for compute functions
//! - `error`: The error taxonomy shared by every pass
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{build, deps, run_many, Cache};
//!
//! # async fn example() -> trellis_core::ResolveResult<()> {
//! let a = build((), |_: Vec<String>| Ok("A".to_string()));
//! let b = build(deps![&a], |args| Ok(format!("{}B", args[0])));
//! let c = build(deps![&a, &b], |args| Ok(format!("{}{}C", args[0], args[1])));
//! let d = build(deps![&b, &c], |args| Ok(format!("{}{}D", args[0], args[1])));
//!
//! // `a`, `b`, `c` and `d` each run once.
//! assert_eq!(d.call().await?, "ABAABCD");
//!
//! // Several targets over one pass.
//! let values = run_many([&b, &d], &Cache::new()).await?;
//! assert_eq!(values, ["AB", "ABAABCD"]);
//!
//! // Injection: a string dependency resolves to whatever is seeded under it.
//! let greet = build(deps!["name"], |args: Vec<String>| Ok(format!("hello {}", args[0])));
//! let cache = Cache::new().with("name", "world".to_string());
//! assert_eq!(greet.call_with(&cache).await?, "hello world");
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod error;
pub mod graph;
pub mod util;

pub use builder::{
    build, build_async, build_memoized, build_memoized_async, depends_on, DependsOn, Handle,
};
pub use error::{BoxError, ResolveError, ResolveResult};
pub use graph::{
    Cache, Compute, Deferred, Dep, DepList, DepsSpec, Identity, MemoState, Node, NodeId,
    NodeKind, NodeValue, ResolveConfig, Resolver,
};

/// Resolve a node or handle over `cache` with the default resolver.
///
/// # Errors
///
/// Fails with the first error raised anywhere in the target's upstream.
pub async fn run<V, T>(target: &T, cache: &Cache<V>) -> ResolveResult<V>
where
    V: NodeValue,
    T: AsRef<Node<V>> + ?Sized,
{
    Resolver::default().run(target, cache).await
}

/// Resolve several targets over one shared pass with the default resolver.
///
/// # Errors
///
/// Fails if the list does not normalize or any target fails.
pub async fn run_many<V, I>(targets: I, cache: &Cache<V>) -> ResolveResult<Vec<V>>
where
    V: NodeValue,
    I: IntoIterator,
    I::Item: Into<Dep<V>>,
{
    Resolver::default().run_many(targets, cache).await
}
