//! Dependency Specs
//!
//! A node declares its dependencies as a list of raw references. Each raw
//! reference is one of a closed set of shapes ([`Dep`]); normalization turns
//! the list into concrete nodes, freshly on every pass, because the list
//! itself may be computed from the pass's cache.
//!
//! # Normalization Rules
//!
//! | Raw reference     | Resolves to                                      |
//! | ----------------- | ------------------------------------------------ |
//! | `Dep::Node`       | the node itself                                  |
//! | `Dep::Handle`     | the handle's backing node                        |
//! | `Dep::Func`       | an anonymous zero-dependency computation         |
//! | `Dep::Key`        | a string leaf (injectable, falls back to itself) |
//! | `Dep::Invalid`    | `InvalidDependencySpec`                          |
//!
//! A spec that is not a sequence at all is rejected the same way.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value as Json;
use smallvec::SmallVec;

use super::cache::Cache;
use super::node::{Compute, Node, NodeId, NodeValue};
use crate::builder::Handle;
use crate::error::{BoxError, ResolveError, ResolveResult};

/// A plain function used directly as a dependency.
///
/// The ID is assigned when the dependency is created, so every reference to
/// the same `FuncDep` (or a clone of it) shares one cache entry.
pub struct FuncDep<V> {
    id: NodeId,
    compute: Compute<V>,
}

impl<V: NodeValue> FuncDep<V> {
    fn to_node(&self) -> Node<V> {
        Node::anonymous(self.id, self.compute.clone())
    }
}

impl<V> Clone for FuncDep<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            compute: self.compute.clone(),
        }
    }
}

/// A raw dependency reference.
pub enum Dep<V> {
    /// A node.
    Node(Node<V>),
    /// A handle produced by the builder.
    Handle(Handle<V>),
    /// A plain function, called with no arguments.
    Func(FuncDep<V>),
    /// A named, injectable parameter.
    Key(Arc<str>),
    /// Anything else. Carries a description of what was found.
    Invalid(String),
}

impl<V: NodeValue> Dep<V> {
    /// A synchronous function dependency.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn() -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self::Func(FuncDep {
            id: NodeId::new(),
            compute: Compute::from_fn(move |_| f()),
        })
    }

    /// An async function dependency.
    pub fn func_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
    {
        Self::Func(FuncDep {
            id: NodeId::new(),
            compute: Compute::from_async(move |_| f()),
        })
    }

    fn normalize(&self, index: usize) -> ResolveResult<Node<V>> {
        match self {
            Self::Node(node) => Ok(node.clone()),
            Self::Handle(handle) => Ok(handle.node().clone()),
            Self::Func(func) => Ok(func.to_node()),
            Self::Key(key) => Ok(Node::value(Arc::clone(key))),
            Self::Invalid(found) => Err(ResolveError::InvalidDependencySpec {
                reason: format!(
                    "dependency {index} is {found}; a dependency must be a node, \
                     a function or a string, never a raw value or a nested array"
                ),
            }),
        }
    }
}

impl<V> Clone for Dep<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Node(node) => Self::Node(node.clone()),
            Self::Handle(handle) => Self::Handle(handle.clone()),
            Self::Func(func) => Self::Func(func.clone()),
            Self::Key(key) => Self::Key(Arc::clone(key)),
            Self::Invalid(found) => Self::Invalid(found.clone()),
        }
    }
}

impl<V> fmt::Debug for Dep<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Self::Handle(handle) => f.debug_tuple("Handle").field(handle.node()).finish(),
            Self::Func(func) => f.debug_tuple("Func").field(&func.id).finish(),
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Self::Invalid(found) => f.debug_tuple("Invalid").field(found).finish(),
        }
    }
}

impl<V> From<Node<V>> for Dep<V> {
    fn from(node: Node<V>) -> Self {
        Self::Node(node)
    }
}

impl<V> From<&Node<V>> for Dep<V> {
    fn from(node: &Node<V>) -> Self {
        Self::Node(node.clone())
    }
}

impl<V> From<Handle<V>> for Dep<V> {
    fn from(handle: Handle<V>) -> Self {
        Self::Handle(handle)
    }
}

impl<V> From<&Handle<V>> for Dep<V> {
    fn from(handle: &Handle<V>) -> Self {
        Self::Handle(handle.clone())
    }
}

impl<V> From<&str> for Dep<V> {
    fn from(key: &str) -> Self {
        Self::Key(Arc::from(key))
    }
}

impl<V> From<String> for Dep<V> {
    fn from(key: String) -> Self {
        Self::Key(Arc::from(key))
    }
}

impl<V> From<Json> for Dep<V> {
    fn from(value: Json) -> Self {
        match value {
            Json::String(key) => Self::Key(Arc::from(key)),
            other => Self::Invalid(describe_json(&other).to_string()),
        }
    }
}

/// The raw dependency list a spec evaluates to.
pub enum DepList<V> {
    /// An ordered sequence of raw references.
    Sequence(Vec<Dep<V>>),
    /// Something that is not a sequence.
    NotSequence(String),
}

impl<V> Clone for DepList<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Sequence(deps) => Self::Sequence(deps.clone()),
            Self::NotSequence(found) => Self::NotSequence(found.clone()),
        }
    }
}

impl<V> From<Vec<Dep<V>>> for DepList<V> {
    fn from(deps: Vec<Dep<V>>) -> Self {
        Self::Sequence(deps)
    }
}

impl<V> From<Json> for DepList<V> {
    fn from(value: Json) -> Self {
        match value {
            Json::Array(items) => Self::Sequence(items.into_iter().map(Dep::from).collect()),
            other => Self::NotSequence(describe_json(&other).to_string()),
        }
    }
}

type DynamicDeps<V> = Arc<dyn Fn(&Cache<V>) -> DepList<V> + Send + Sync>;

/// How a node declares its dependencies.
pub enum DepsSpec<V> {
    /// A fixed list.
    Fixed(DepList<V>),
    /// A list chosen from the current pass's cache.
    Dynamic(DynamicDeps<V>),
}

impl<V> DepsSpec<V> {
    /// No dependencies.
    pub fn none() -> Self {
        Self::Fixed(DepList::Sequence(Vec::new()))
    }

    /// Dependencies selected against the cache at resolution time.
    pub fn dynamic<F, L>(f: F) -> Self
    where
        F: Fn(&Cache<V>) -> L + Send + Sync + 'static,
        L: Into<DepList<V>>,
    {
        Self::Dynamic(Arc::new(move |cache| f(cache).into()))
    }

    /// Move every node held directly by a fixed list into `out`.
    pub(crate) fn drain_nodes_into(&mut self, out: &mut Vec<Node<V>>) {
        if let Self::Fixed(DepList::Sequence(deps)) = self {
            for dep in deps.drain(..) {
                match dep {
                    Dep::Node(node) => out.push(node),
                    Dep::Handle(handle) => out.push(handle.into_node()),
                    Dep::Func(_) | Dep::Key(_) | Dep::Invalid(_) => {}
                }
            }
        }
    }
}

impl<V> Default for DepsSpec<V> {
    fn default() -> Self {
        Self::none()
    }
}

impl<V> Clone for DepsSpec<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(list) => Self::Fixed(list.clone()),
            Self::Dynamic(f) => Self::Dynamic(Arc::clone(f)),
        }
    }
}

impl<V> From<()> for DepsSpec<V> {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

impl<V> From<Vec<Dep<V>>> for DepsSpec<V> {
    fn from(deps: Vec<Dep<V>>) -> Self {
        Self::Fixed(DepList::Sequence(deps))
    }
}

impl<V, const N: usize> From<[Dep<V>; N]> for DepsSpec<V> {
    fn from(deps: [Dep<V>; N]) -> Self {
        Self::Fixed(DepList::Sequence(deps.into()))
    }
}

impl<V> From<Option<Vec<Dep<V>>>> for DepsSpec<V> {
    fn from(deps: Option<Vec<Dep<V>>>) -> Self {
        deps.map(Self::from).unwrap_or_default()
    }
}

impl<V> From<DepList<V>> for DepsSpec<V> {
    fn from(list: DepList<V>) -> Self {
        Self::Fixed(list)
    }
}

impl<V> From<Json> for DepsSpec<V> {
    fn from(value: Json) -> Self {
        Self::Fixed(DepList::from(value))
    }
}

/// Normalize a spec into concrete nodes, in declared order.
pub(crate) fn normalize<V: NodeValue>(
    spec: &DepsSpec<V>,
    cache: &Cache<V>,
) -> ResolveResult<SmallVec<[Node<V>; 4]>> {
    match spec {
        DepsSpec::Fixed(list) => normalize_list(list),
        DepsSpec::Dynamic(f) => normalize_list(&f(cache)),
    }
}

pub(crate) fn normalize_list<V: NodeValue>(
    list: &DepList<V>,
) -> ResolveResult<SmallVec<[Node<V>; 4]>> {
    match list {
        DepList::Sequence(deps) => deps
            .iter()
            .enumerate()
            .map(|(index, dep)| dep.normalize(index))
            .collect(),
        DepList::NotSequence(found) => Err(ResolveError::InvalidDependencySpec {
            reason: format!("dependencies must be given as a sequence, got {found}"),
        }),
    }
}

fn describe_json(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::graph::node::{Identity, NodeKind};
    use serde_json::json;

    fn spec(deps: Vec<Dep<Json>>) -> DepsSpec<Json> {
        DepsSpec::from(deps)
    }

    #[test]
    fn every_shape_normalizes() {
        let node = Node::constant(json!(1));
        let handle = build((), |_| Ok(json!(2)));
        let deps = spec(vec![
            Dep::from(&node),
            Dep::from(&handle),
            Dep::func(|| Ok(json!(3))),
            Dep::from("k"),
        ]);

        let nodes = normalize(&deps, &Cache::new()).unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].identity(), node.identity());
        assert_eq!(nodes[1].identity(), handle.node().identity());
        assert_eq!(nodes[2].kind(), NodeKind::Computation);
        assert_eq!(nodes[3].identity(), &Identity::from("k"));
        assert_eq!(nodes[3].kind(), NodeKind::Value);
    }

    #[test]
    fn function_dependency_keeps_its_identity() {
        let f: Dep<Json> = Dep::func(|| Ok(json!(3)));
        let deps = spec(vec![f.clone(), f]);
        let nodes = normalize(&deps, &Cache::new()).unwrap();
        assert_eq!(nodes[0].identity(), nodes[1].identity());
    }

    #[test]
    fn raw_values_are_rejected() {
        let deps: DepsSpec<Json> = DepsSpec::from(json!(["k", 3]));
        let err = normalize(&deps, &Cache::new()).unwrap_err();
        match err {
            ResolveError::InvalidDependencySpec { reason } => {
                assert!(reason.starts_with("dependency 1 is a number"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nested_arrays_are_rejected() {
        let deps: DepsSpec<Json> = DepsSpec::from(json!([["k"]]));
        assert!(matches!(
            normalize(&deps, &Cache::new()),
            Err(ResolveError::InvalidDependencySpec { .. })
        ));
    }

    #[test]
    fn non_sequence_spec_is_rejected() {
        let deps: DepsSpec<Json> = DepsSpec::from(json!({ "a": 1 }));
        let err = normalize(&deps, &Cache::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid dependency spec: dependencies must be given as a sequence, got an object"
        );
    }

    #[test]
    fn dynamic_spec_reads_the_cache() {
        let fallback = Node::constant(json!("computed"));
        let fallback_dep = Dep::from(&fallback);
        let deps: DepsSpec<Json> = DepsSpec::dynamic(move |cache: &Cache<Json>| {
            if cache.contains_key("override") {
                vec![Dep::from("override")]
            } else {
                vec![fallback_dep.clone()]
            }
        });

        let plain = normalize(&deps, &Cache::new()).unwrap();
        assert_eq!(plain[0].identity(), fallback.identity());

        let seeded = Cache::new().with("override", json!(1));
        let injected = normalize(&deps, &seeded).unwrap();
        assert_eq!(injected[0].identity(), &Identity::from("override"));
    }

    #[test]
    fn missing_spec_means_no_dependencies() {
        let deps: DepsSpec<Json> = DepsSpec::from(None);
        assert!(normalize(&deps, &Cache::new()).unwrap().is_empty());
    }
}
