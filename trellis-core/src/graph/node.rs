//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! A node carries three things: an identity (the key the per-pass cache is
//! indexed by), a dependency spec that is normalized fresh on every pass,
//! and a body that turns the resolved dependency values into a value.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use smallvec::SmallVec;

use super::cache::Cache;
use super::dep::{self, DepsSpec};
use super::memo::{MemoCell, MemoState};
use super::resolver::Resolver;
use crate::error::{BoxError, ResolveError, ResolveResult};

/// Values that can flow through a graph.
///
/// `From<String>` is what lets a string dependency fall back to its own
/// literal when nothing was injected under that key.
pub trait NodeValue: Clone + Send + Sync + From<String> + 'static {}

impl<T> NodeValue for T where T: Clone + Send + Sync + From<String> + 'static {}

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The key a node is deduplicated and injected under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Reference identity: the node itself.
    Node(NodeId),
    /// A named identity, used by string leaves and tagged nodes.
    Key(Arc<str>),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => id.fmt(f),
            Self::Key(key) => write!(f, "{key:?}"),
        }
    }
}

impl From<NodeId> for Identity {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<&str> for Identity {
    fn from(key: &str) -> Self {
        Self::Key(Arc::from(key))
    }
}

impl From<String> for Identity {
    fn from(key: String) -> Self {
        Self::Key(Arc::from(key))
    }
}

impl From<Arc<str>> for Identity {
    fn from(key: Arc<str>) -> Self {
        Self::Key(key)
    }
}

impl<V> From<&Node<V>> for Identity {
    fn from(node: &Node<V>) -> Self {
        node.identity().clone()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A node whose compute function runs once per pass.
    Computation,

    /// A leaf holding a literal. No dependencies.
    Value,

    /// A computation whose result persists across passes until invalidated.
    Memoized,
}

/// Future returned by a compute function.
pub type ComputeFuture<V> = BoxFuture<'static, Result<V, BoxError>>;

type ComputeFn<V> = Arc<dyn Fn(Vec<V>) -> ComputeFuture<V> + Send + Sync>;

/// A node's function: resolved dependency values in, a value (or a failure)
/// out.
pub struct Compute<V> {
    f: ComputeFn<V>,
}

impl<V: NodeValue> Compute<V> {
    /// A synchronous compute function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Vec<V>) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |args| future::ready(f(args)).boxed()),
        }
    }

    /// A compute function returning a future.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |args| f(args).boxed()),
        }
    }

    /// Invoke the function with dependency values in declared order.
    pub fn invoke(&self, args: Vec<V>) -> ComputeFuture<V> {
        (self.f)(args)
    }
}

impl<V> Clone for Compute<V> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<V> fmt::Debug for Compute<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Compute(..)")
    }
}

/// What a pass resolves before invoking a node.
pub(crate) enum Plan<V> {
    /// Resolve these dependencies and invoke with their values.
    Resolve(SmallVec<[Node<V>; 4]>),
    /// A memo is held; read it instead of resolving anything.
    ReuseMemo,
}

pub(crate) enum Body<V> {
    Computation(Compute<V>),
    Value(V),
    Memoized(MemoCell<V>),
}

impl<V: Clone> Clone for Body<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Computation(compute) => Self::Computation(compute.clone()),
            Self::Value(value) => Self::Value(value.clone()),
            Self::Memoized(cell) => Self::Memoized(cell.clone()),
        }
    }
}

struct NodeInner<V> {
    /// `None` for string leaves, which are keyed by their literal.
    id: Option<NodeId>,
    identity: Identity,
    deps: DepsSpec<V>,
    body: Body<V>,
}

impl<V> Drop for NodeInner<V> {
    /// Unlinks long dependency chains one node at a time instead of
    /// recursing through them.
    fn drop(&mut self) {
        let mut orphans = Vec::new();
        self.deps.drain_nodes_into(&mut orphans);
        while let Some(node) = orphans.pop() {
            if let Some(mut inner) = Arc::into_inner(node.inner) {
                inner.deps.drain_nodes_into(&mut orphans);
            }
        }
    }
}

/// A vertex in the dependency graph.
///
/// Nodes are immutable once built and cheap to clone; clones share the
/// same identity, so referencing a clone is referencing the node.
pub struct Node<V> {
    inner: Arc<NodeInner<V>>,
}

impl<V: NodeValue> Node<V> {
    fn from_parts(deps: DepsSpec<V>, body: impl FnOnce(NodeId) -> Body<V>) -> Self {
        let id = NodeId::new();
        Self {
            inner: Arc::new(NodeInner {
                id: Some(id),
                identity: Identity::Node(id),
                deps,
                body: body(id),
            }),
        }
    }

    /// Create a computation node.
    pub fn new(deps: impl Into<DepsSpec<V>>, compute: Compute<V>) -> Self {
        Self::from_parts(deps.into(), |_| Body::Computation(compute))
    }

    /// Create a memoized computation node.
    pub fn memoized(deps: impl Into<DepsSpec<V>>, compute: Compute<V>) -> Self {
        Self::from_parts(deps.into(), |id| Body::Memoized(MemoCell::new(id, compute)))
    }

    /// Create a node that always yields `value`.
    pub fn constant(value: V) -> Self {
        Self::from_parts(DepsSpec::default(), |_| Body::Value(value))
    }

    /// Create a string leaf. The key is both the identity and the fallback
    /// value.
    pub fn value(key: impl Into<Arc<str>>) -> Self {
        let key = key.into();
        let value = V::from(key.to_string());
        Self {
            inner: Arc::new(NodeInner {
                id: None,
                identity: Identity::Key(key),
                deps: DepsSpec::default(),
                body: Body::Value(value),
            }),
        }
    }

    pub(crate) fn anonymous(id: NodeId, compute: Compute<V>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: Some(id),
                identity: Identity::Node(id),
                deps: DepsSpec::default(),
                body: Body::Computation(compute),
            }),
        }
    }

    /// Return a copy of this node resolved and injected under `identity`.
    pub fn with_identity(self, identity: impl Into<Identity>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: self.inner.id,
                identity: identity.into(),
                deps: self.inner.deps.clone(),
                body: self.inner.body.clone(),
            }),
        }
    }

    /// Normalize the dependency spec against `cache`.
    ///
    /// A memoized node holding a memo reports no dependencies.
    pub fn deps(&self, cache: &Cache<V>) -> ResolveResult<SmallVec<[Node<V>; 4]>> {
        match self.plan(cache)? {
            Plan::Resolve(deps) => Ok(deps),
            Plan::ReuseMemo => Ok(SmallVec::new()),
        }
    }

    /// Decide what a pass resolves before invoking this node.
    pub(crate) fn plan(&self, cache: &Cache<V>) -> ResolveResult<Plan<V>> {
        if let Body::Memoized(cell) = &self.inner.body {
            if cell.holds_memo() {
                return Ok(Plan::ReuseMemo);
            }
        }
        self.declared_deps(cache).map(Plan::Resolve)
    }

    /// Normalize the dependency spec, regardless of memo state.
    pub(crate) fn declared_deps(&self, cache: &Cache<V>) -> ResolveResult<SmallVec<[Node<V>; 4]>> {
        dep::normalize(&self.inner.deps, cache)
    }

    /// The memo of a memoized node, if it holds one right now.
    pub(crate) fn held_memo(&self) -> Option<BoxFuture<'static, ResolveResult<V>>> {
        match &self.inner.body {
            Body::Memoized(cell) => cell.held(),
            _ => None,
        }
    }

    /// Invoke the body with resolved dependency values.
    pub(crate) fn invoke(&self, args: Vec<V>) -> BoxFuture<'static, ResolveResult<V>> {
        match &self.inner.body {
            Body::Computation(compute) => compute
                .invoke(args)
                .map(|outcome| outcome.map_err(ResolveError::from_compute))
                .boxed(),
            Body::Value(value) => future::ready(Ok(value.clone())).boxed(),
            Body::Memoized(cell) => cell.invoke(args),
        }
    }

    /// Resolve this node over `cache` with the default resolver.
    pub async fn run(&self, cache: &Cache<V>) -> ResolveResult<V> {
        Resolver::default().run(self, cache).await
    }

    /// Drop the memo of a memoized node, restoring its dependencies.
    ///
    /// Returns `false` for nodes that are not memoized.
    pub fn invalidate(&self) -> bool {
        match &self.inner.body {
            Body::Memoized(cell) => {
                cell.invalidate();
                true
            }
            _ => false,
        }
    }

    /// Current memo state, if this node is memoized.
    pub fn memo_state(&self) -> Option<MemoState> {
        match &self.inner.body {
            Body::Memoized(cell) => Some(cell.state()),
            _ => None,
        }
    }
}

impl<V> Node<V> {
    /// Get the node's ID. String leaves have none.
    pub fn id(&self) -> Option<NodeId> {
        self.inner.id
    }

    /// Get the identity the node is cached under.
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        match self.inner.body {
            Body::Computation(_) => NodeKind::Computation,
            Body::Value(_) => NodeKind::Value,
            Body::Memoized(_) => NodeKind::Memoized,
        }
    }
}

impl<V> Clone for Node<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> AsRef<Node<V>> for Node<V> {
    fn as_ref(&self) -> &Node<V> {
        self
    }
}

impl<V> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("identity", &self.inner.identity)
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dep::Dep;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn computation_node_uses_its_own_identity() {
        let node: Node<String> = Node::new((), Compute::from_fn(|_| Ok("A".into())));
        assert_eq!(node.kind(), NodeKind::Computation);
        assert_eq!(node.identity(), &Identity::Node(node.id().unwrap()));
        assert_eq!(node.clone().identity(), node.identity());
    }

    #[test]
    fn string_leaf_is_keyed_by_its_literal() {
        let leaf: Node<String> = Node::value("mul");
        assert_eq!(leaf.kind(), NodeKind::Value);
        assert_eq!(leaf.identity(), &Identity::from("mul"));
        assert_eq!(leaf.id(), None);
        assert!(leaf.deps(&Cache::new()).unwrap().is_empty());
    }

    #[test]
    fn tagging_changes_identity_only() {
        let node: Node<String> = Node::new((), Compute::from_fn(|_| Ok("A".into())));
        let tagged = node.clone().with_identity("alias");
        assert_eq!(tagged.id(), node.id());
        assert_eq!(tagged.identity(), &Identity::from("alias"));
        assert_eq!(tagged.kind(), NodeKind::Computation);
    }

    #[test]
    fn deps_are_normalized_in_order() {
        let a: Node<String> = Node::constant("a".into());
        let node = Node::new(
            vec![Dep::from(&a), Dep::from("k")],
            Compute::from_fn(|args| Ok(args.concat())),
        );
        let deps = node.deps(&Cache::new()).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].identity(), a.identity());
        assert_eq!(deps[1].identity(), &Identity::from("k"));
    }

    #[test]
    fn only_memoized_nodes_invalidate() {
        let plain: Node<String> = Node::new((), Compute::from_fn(|_| Ok("A".into())));
        let memo: Node<String> = Node::memoized((), Compute::from_fn(|_| Ok("A".into())));
        assert!(!plain.invalidate());
        assert!(memo.invalidate());
        assert_eq!(plain.memo_state(), None);
        assert_eq!(memo.memo_state(), Some(MemoState::NotMemoized));
    }

    #[test]
    fn identity_display() {
        let key = Identity::from("mul");
        assert_eq!(key.to_string(), "\"mul\"");
        let id = NodeId::new();
        assert_eq!(Identity::Node(id).to_string(), format!("node#{}", id.raw()));
    }
}
