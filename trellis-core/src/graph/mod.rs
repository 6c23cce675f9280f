//! Dependency Graph
//!
//! This module implements the dependency graph and its resolution engine.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes carry an identity, a dependency spec and a compute function
//! - Edges are declared by the dependent: a node lists what it consumes
//!
//! A resolution pass walks the graph from a target, resolves every
//! dependency before invoking the dependent's compute, and runs each
//! identity at most once by keeping one deferred per identity in the pass's
//! cache.
//!
//! # Design Decisions
//!
//! 1. Identity is explicit. A node's default identity is its `NodeId`, which
//!    clones share; string leaves and tagged nodes use a string identity.
//!    This is what makes injection work: seed the cache under an identity
//!    and the node is never computed.
//!
//! 2. The graph is not stored centrally. Nodes hold their dependency specs
//!    and the pass discovers the graph as it goes, since specs may depend
//!    on the cache.
//!
//! 3. Memoized nodes keep their state next to the node, not in the cache,
//!    so it survives across passes.

mod cache;
mod dep;
mod memo;
mod node;
mod resolver;

pub use cache::{Cache, Deferred};
pub use dep::{Dep, DepList, DepsSpec, FuncDep};
pub use memo::MemoState;
pub use node::{Compute, ComputeFuture, Identity, Node, NodeId, NodeKind, NodeValue};
pub use resolver::{ResolveConfig, Resolver};
