//! Builder Facade
//!
//! The ergonomic entry point: build a node from a dependency list and a
//! function, and get back a [`Handle`] that resolves it on demand.
//!
//! ```rust
//! use trellis_core::{build, deps};
//!
//! # async fn example() -> trellis_core::ResolveResult<()> {
//! let a = build((), |_: Vec<String>| Ok("A".to_string()));
//! let b = build(deps![&a], |args| Ok(format!("{}B", args[0])));
//!
//! assert_eq!(b.call().await?, "AB");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;

use crate::error::{BoxError, ResolveResult};
use crate::graph::{Cache, Compute, DepsSpec, Node, NodeValue, Resolver};

/// A resolvable handle around a node.
///
/// Handles can be passed anywhere a dependency is expected, interchangeably
/// with their backing node.
pub struct Handle<V> {
    node: Node<V>,
    resolver: Resolver,
}

impl<V> Handle<V> {
    /// The backing node.
    pub fn node(&self) -> &Node<V> {
        &self.node
    }

    pub(crate) fn into_node(self) -> Node<V> {
        self.node
    }
}

impl<V: NodeValue> Handle<V> {
    /// Wrap an existing node.
    pub fn from_node(node: Node<V>) -> Self {
        Self {
            node,
            resolver: Resolver::default(),
        }
    }

    /// Resolve with `resolver` instead of the default one.
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Resolve over a fresh cache.
    pub async fn call(&self) -> ResolveResult<V> {
        self.call_with(&Cache::new()).await
    }

    /// Resolve over `cache`, sharing its entries with other passes that use
    /// it.
    pub async fn call_with(&self, cache: &Cache<V>) -> ResolveResult<V> {
        self.resolver.run(&self.node, cache).await
    }

    /// Drop the memo of a memoized handle. Returns `false` if the backing
    /// node is not memoized.
    pub fn invalidate(&self) -> bool {
        self.node.invalidate()
    }
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<V> AsRef<Node<V>> for Handle<V> {
    fn as_ref(&self) -> &Node<V> {
        &self.node
    }
}

impl<V> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("node", &self.node).finish()
    }
}

/// Build a handle from dependencies and a synchronous function.
pub fn build<V, F>(deps: impl Into<DepsSpec<V>>, f: F) -> Handle<V>
where
    V: NodeValue,
    F: Fn(Vec<V>) -> Result<V, BoxError> + Send + Sync + 'static,
{
    Handle::from_node(Node::new(deps, Compute::from_fn(f)))
}

/// Build a handle from dependencies and an async function.
pub fn build_async<V, F, Fut>(deps: impl Into<DepsSpec<V>>, f: F) -> Handle<V>
where
    V: NodeValue,
    F: Fn(Vec<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
{
    Handle::from_node(Node::new(deps, Compute::from_async(f)))
}

/// Build a memoized handle from dependencies and a synchronous function.
pub fn build_memoized<V, F>(deps: impl Into<DepsSpec<V>>, f: F) -> Handle<V>
where
    V: NodeValue,
    F: Fn(Vec<V>) -> Result<V, BoxError> + Send + Sync + 'static,
{
    Handle::from_node(Node::memoized(deps, Compute::from_fn(f)))
}

/// Build a memoized handle from dependencies and an async function.
pub fn build_memoized_async<V, F, Fut>(deps: impl Into<DepsSpec<V>>, f: F) -> Handle<V>
where
    V: NodeValue,
    F: Fn(Vec<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
{
    Handle::from_node(Node::memoized(deps, Compute::from_async(f)))
}

/// Curried builder: fix the dependencies first, the function later.
pub fn depends_on<V: NodeValue>(deps: impl Into<DepsSpec<V>>) -> DependsOn<V> {
    DependsOn { deps: deps.into() }
}

/// Dependencies waiting for a function. See [`depends_on`].
pub struct DependsOn<V> {
    deps: DepsSpec<V>,
}

impl<V: NodeValue> DependsOn<V> {
    /// Finish with a synchronous function.
    pub fn build<F>(self, f: F) -> Handle<V>
    where
        F: Fn(Vec<V>) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        build(self.deps, f)
    }

    /// Finish with an async function.
    pub fn build_async<F, Fut>(self, f: F) -> Handle<V>
    where
        F: Fn(Vec<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
    {
        build_async(self.deps, f)
    }

    /// Finish with a synchronous function, memoized.
    pub fn build_memoized<F>(self, f: F) -> Handle<V>
    where
        F: Fn(Vec<V>) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        build_memoized(self.deps, f)
    }
}

/// Build a dependency list from nodes, handles, function deps and strings.
///
/// ```rust
/// use trellis_core::{build, deps, DepsSpec};
///
/// let a = build((), |_: Vec<String>| Ok("A".to_string()));
/// let spec: DepsSpec<String> = deps![&a, "name"];
/// ```
#[macro_export]
macro_rules! deps {
    ($($dep:expr),* $(,)?) => {
        $crate::DepsSpec::from(::std::vec![$($crate::Dep::from($dep)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dep, MemoState, NodeKind};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn works_without_deps() {
        let handle = build((), |_: Vec<String>| Ok(String::new()));
        assert!(handle.node().deps(&Cache::new()).unwrap().is_empty());
        assert_eq!(handle.node().kind(), NodeKind::Computation);
    }

    #[test]
    fn exposes_dependencies() {
        let a = build((), |_: Vec<String>| Ok("1".into()));
        let b = build((), |_: Vec<String>| Ok("2".into()));
        let d = build(deps![&a, &b], |args| Ok(args.concat()));
        let nodes = d.node().deps(&Cache::new()).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].identity(), a.node().identity());
    }

    #[test]
    fn depends_on_curries() {
        let a = build((), |_: Vec<String>| Ok("1".into()));
        let b = build((), |_: Vec<String>| Ok("2".into()));
        let d = depends_on(deps![&a, &b]).build(|args| Ok(args.concat()));
        assert_eq!(d.node().deps(&Cache::new()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn handle_resolves_over_fresh_cache_each_call() {
        let calls = Arc::new(AtomicI32::new(0));
        let counter = calls.clone();
        let a = build((), move |_: Vec<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("A".into())
        });

        assert_eq!(a.call().await.unwrap(), "A");
        assert_eq!(a.call().await.unwrap(), "A");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handle_shares_a_supplied_cache() {
        let calls = Arc::new(AtomicI32::new(0));
        let counter = calls.clone();
        let a = build((), move |_: Vec<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("A".into())
        });

        let cache = Cache::new();
        a.call_with(&cache).await.unwrap();
        a.call_with(&cache).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_builders() {
        let a = build_async((), |_: Vec<String>| async { Ok::<_, BoxError>("A".to_string()) });
        let b = depends_on(deps![&a])
            .build_async(|args: Vec<String>| async move { Ok::<_, BoxError>(args.concat() + "B") });
        assert_eq!(b.call().await.unwrap(), "AB");
    }

    #[tokio::test]
    async fn memoized_handle_invalidates() {
        let memo = build_memoized((), |_: Vec<String>| Ok("M".into()));
        assert_eq!(memo.node().memo_state(), Some(MemoState::NotMemoized));

        memo.call().await.unwrap();
        assert_eq!(memo.node().memo_state(), Some(MemoState::Memoized));

        assert!(memo.invalidate());
        assert_eq!(memo.node().memo_state(), Some(MemoState::NotMemoized));
    }

    #[tokio::test]
    async fn memoized_async_handle() {
        let memo = build_memoized_async((), |_: Vec<String>| async {
            Ok::<_, BoxError>("M".to_string())
        });
        assert_eq!(memo.call().await.unwrap(), "M");
        assert_eq!(memo.node().kind(), NodeKind::Memoized);
    }

    #[tokio::test]
    async fn custom_resolver() {
        let a = build((), |_: Vec<String>| Ok("A".into()))
            .with_resolver(Resolver::new().with_yield_before_compute(false));
        assert_eq!(a.call().await.unwrap(), "A");
    }

    #[test]
    fn handle_and_node_are_interchangeable() {
        let a = build((), |_: Vec<String>| Ok("A".into()));
        let via_handle: Dep<String> = Dep::from(&a);
        let via_node: Dep<String> = Dep::from(a.node());
        let spec: DepsSpec<String> = vec![via_handle, via_node].into();
        let nodes = crate::graph::Node::new(spec, Compute::from_fn(|args| Ok(args.concat())))
            .deps(&Cache::new())
            .unwrap();
        assert_eq!(nodes[0].identity(), nodes[1].identity());
    }
}
